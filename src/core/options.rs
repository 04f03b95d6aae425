//! Built-in field options.
//!
//! Path options reserve a trie position when they compile and consume one
//! path segment per request. Request options compute the field from the
//! request head or the buffered body.
use std::{any::Any, str::FromStr};

use bytes::Bytes;
use http::header::HeaderName;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::core::{
    error::BoxError,
    modifier::{Closer, FieldModifier, FieldOption},
    route::RequestContext,
    schema::Remainder,
};

/// A request value an option expected was absent or ambiguous.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValueError {
    #[error("missing header {0}")]
    MissingHeader(HeaderName),

    #[error("header {0} is not visible ASCII")]
    OpaqueHeader(HeaderName),

    #[error("no value for query parameter {0}")]
    MissingQuery(String),

    #[error("expected 1 value for query parameter {name}, got {count}")]
    RepeatedQuery { name: String, count: usize },
}

fn pop_fixed<T: Any + Send>() -> Option<FieldModifier<T>> {
    Some(Box::new(|ctx: &mut RequestContext, _: &mut T| {
        ctx.pop_segment()?;
        Ok(None)
    }))
}

/// Reserve a fixed segment named after the field, e.g. with
/// `str::to_lowercase` a field `Foo` matches `/foo`.
pub fn path_by_name<T, F>(convert: F) -> FieldOption<T>
where
    T: Any + Send,
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    FieldOption::new(move |route, field| {
        route.add_fixed_to_path(convert(field.name))?;
        Ok(pop_fixed())
    })
}

/// Reserve the fixed segment `literal`.
pub fn path<T: Any + Send>(literal: impl Into<String>) -> FieldOption<T> {
    let literal = literal.into();
    FieldOption::new(move |route, _| {
        route.add_fixed_to_path(literal.clone())?;
        Ok(pop_fixed())
    })
}

/// Reserve a variable segment and hand it to `parse` together with the
/// field.
pub fn path_id<T, F>(parse: F) -> FieldOption<T>
where
    T: Any + Send,
    F: Fn(String, &mut T) -> Result<(), BoxError> + Clone + Send + Sync + 'static,
{
    FieldOption::new(move |route, _| {
        route.add_var_to_path()?;
        let parse = parse.clone();
        let modifier: FieldModifier<T> = Box::new(move |ctx: &mut RequestContext, value: &mut T| {
            parse(ctx.pop_segment()?, value)?;
            Ok(None)
        });
        Ok(Some(modifier))
    })
}

/// Bind a variable segment verbatim.
pub fn string_path_ids() -> FieldOption<String> {
    path_id(|id, value: &mut String| {
        *value = id;
        Ok(())
    })
}

/// Bind a variable segment parsed as a signed integer.
pub fn int_path_ids() -> FieldOption<i64> {
    parsed_path_ids()
}

/// Bind a variable segment through `T::from_str`.
pub fn parsed_path_ids<T>() -> FieldOption<T>
where
    T: FromStr + Any + Send,
    T::Err: Into<BoxError>,
{
    path_id(|id, value: &mut T| {
        *value = id.parse::<T>().map_err(Into::<BoxError>::into)?;
        Ok(())
    })
}

/// Let the route absorb every unmatched suffix and store it in the field.
pub fn path_remainder() -> FieldOption<Remainder> {
    FieldOption::new(|route, _| {
        route.allow_remainder()?;
        let modifier: FieldModifier<Remainder> =
            Box::new(|ctx: &mut RequestContext, value: &mut Remainder| {
                *value = Remainder(ctx.take_remaining());
                Ok(None)
            });
        Ok(Some(modifier))
    })
}

/// Set the field from the request.
pub fn request_value<T, F>(f: F) -> FieldOption<T>
where
    T: Any + Send,
    F: Fn(&RequestContext, &mut T) -> Result<(), BoxError> + Clone + Send + Sync + 'static,
{
    FieldOption::from_modifier(move |ctx: &mut RequestContext, value: &mut T| {
        f(ctx, value)?;
        Ok(None)
    })
}

/// Set the field from the request and register `Closer` to run once the
/// request concluded.
pub fn closable_request_value<T, F>(f: F) -> FieldOption<T>
where
    T: Any + Send,
    F: Fn(&RequestContext, &mut T) -> Result<Closer, BoxError> + Clone + Send + Sync + 'static,
{
    FieldOption::from_modifier(move |ctx: &mut RequestContext, value: &mut T| {
        f(ctx, value).map(Some)
    })
}

/// Decode the buffered request body into the field.
pub fn body<T, F>(decoder: F) -> FieldOption<T>
where
    T: Any + Send,
    F: Fn(&Bytes, &mut T) -> Result<(), BoxError> + Clone + Send + Sync + 'static,
{
    request_value(move |ctx: &RequestContext, value: &mut T| decoder(ctx.body(), value))
}

/// Decode the request body as JSON.
pub fn json_body<T>() -> FieldOption<T>
where
    T: DeserializeOwned + Any + Send,
{
    body(|bytes: &Bytes, value: &mut T| {
        *value = serde_json::from_slice(bytes)?;
        Ok(())
    })
}

/// Parse a required header through `T::from_str`.
pub fn header<T>(name: HeaderName) -> FieldOption<T>
where
    T: FromStr + Any + Send,
    T::Err: Into<BoxError>,
{
    request_value(move |ctx: &RequestContext, value: &mut T| {
        let raw = ctx
            .headers()
            .get(&name)
            .ok_or_else(|| ValueError::MissingHeader(name.clone()))?;
        let text = raw
            .to_str()
            .map_err(|_| ValueError::OpaqueHeader(name.clone()))?;
        *value = text.parse::<T>().map_err(Into::<BoxError>::into)?;
        Ok(())
    })
}

/// Parse a single-valued query parameter through `T::from_str`.
///
/// The parameter must be present exactly once.
pub fn query_value<T>(name: impl Into<String>) -> FieldOption<T>
where
    T: FromStr + Any + Send,
    T::Err: Into<BoxError>,
{
    let name = name.into();
    request_value(move |ctx: &RequestContext, value: &mut T| {
        let raw = single_query_value(ctx, &name)?
            .ok_or_else(|| ValueError::MissingQuery(name.clone()))?;
        *value = raw.parse::<T>().map_err(Into::<BoxError>::into)?;
        Ok(())
    })
}

/// Like [`query_value`] for an optional parameter: absent leaves `None`.
pub fn optional_query_value<T>(name: impl Into<String>) -> FieldOption<Option<T>>
where
    T: FromStr + Any + Send,
    T::Err: Into<BoxError>,
{
    let name = name.into();
    request_value(move |ctx: &RequestContext, value: &mut Option<T>| {
        *value = match single_query_value(ctx, &name)? {
            Some(raw) => Some(raw.parse::<T>().map_err(Into::<BoxError>::into)?),
            None => None,
        };
        Ok(())
    })
}

/// Parse every value of a repeated query parameter, in request order.
///
/// An absent parameter binds an empty list; one bad value fails the field.
pub fn query_values<T>(name: impl Into<String>) -> FieldOption<Vec<T>>
where
    T: FromStr + Any + Send,
    T::Err: Into<BoxError>,
{
    let name = name.into();
    request_value(move |ctx: &RequestContext, value: &mut Vec<T>| {
        *value = all_query_values(ctx, &name)
            .into_iter()
            .map(|raw| raw.parse::<T>().map_err(Into::<BoxError>::into))
            .collect::<Result<_, _>>()?;
        Ok(())
    })
}

fn all_query_values(ctx: &RequestContext, name: &str) -> Vec<String> {
    let query = ctx.uri().query().unwrap_or_default();
    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .collect()
}

fn single_query_value(ctx: &RequestContext, name: &str) -> Result<Option<String>, ValueError> {
    let mut values = all_query_values(ctx, name);
    match values.len() {
        0 => Ok(None),
        1 => Ok(values.pop()),
        count => Err(ValueError::RepeatedQuery {
            name: name.to_string(),
            count,
        }),
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use serde::Deserialize;

    use super::*;
    use crate::core::{
        modifier::{FieldInfo, compose},
        route::{Route, test_context},
        schema::{Fixed, TypeTag},
    };

    fn info<T: Any>(name: &'static str) -> FieldInfo {
        FieldInfo {
            name,
            tag: TypeTag::of::<T>(),
        }
    }

    fn apply<T: Any + Send + Default>(
        option: FieldOption<T>,
        field: &'static str,
        ctx: &mut RequestContext,
    ) -> Result<T, BoxError> {
        let modifier = compose(&[option], &mut Route::new(), &info::<T>(field))
            .map_err(|e| -> BoxError { Box::new(e) })?;
        let mut value = T::default();
        modifier(ctx, &mut value)?;
        Ok(value)
    }

    #[test]
    fn test_path_options_reserve_segments() {
        let mut route = Route::new();
        for option in [path_by_name::<Fixed, _>(|name| name.to_lowercase()), path("stuff")] {
            compose(&[option], &mut route, &info::<Fixed>("Greeting")).unwrap();
        }
        compose(&[int_path_ids()], &mut route, &info::<i64>("IntID")).unwrap();
        assert_eq!(route.to_string(), "/greeting/stuff/{}");
    }

    #[test]
    fn test_int_path_ids_parse_failure_is_an_error() {
        let mut ctx = test_context(Method::GET, "/seven", "");
        let err = apply(int_path_ids(), "IntID", &mut ctx).unwrap_err();
        assert_eq!(err.to_string(), "invalid digit found in string");

        let mut ctx = test_context(Method::GET, "/-7", "");
        assert_eq!(apply(int_path_ids(), "IntID", &mut ctx).unwrap(), -7);
    }

    #[test]
    fn test_string_path_ids_take_decoded_segment() {
        let mut ctx = test_context(Method::GET, "/%2FWorld", "");
        assert_eq!(
            apply(string_path_ids(), "StringID", &mut ctx).unwrap(),
            "/World"
        );
    }

    #[test]
    fn test_remainder_takes_everything_left() {
        let mut ctx = test_context(Method::GET, "/a/b%20c/d", "");
        let rest = apply(path_remainder(), "rest", &mut ctx).unwrap();
        assert_eq!(rest.segments(), ["a", "b c", "d"]);
        assert_eq!(rest.joined(), "a/b c/d");
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Greeting {
        #[serde(rename = "Greetings")]
        greetings: String,
    }

    #[test]
    fn test_json_body() {
        let mut ctx = test_context(Method::POST, "/", r#"{"Greetings":"Hello Body"}"#);
        let body = apply(json_body::<Greeting>(), "Body", &mut ctx).unwrap();
        assert_eq!(body.greetings, "Hello Body");

        let mut ctx = test_context(Method::POST, "/", "{");
        assert!(apply(json_body::<Greeting>(), "Body", &mut ctx).is_err());
    }

    #[test]
    fn test_header_value() {
        let (parts, ()) = http::Request::builder()
            .uri("/")
            .header("x-count", "12")
            .body(())
            .unwrap()
            .into_parts();
        let mut ctx = RequestContext::new(parts, Bytes::new(), Vec::new());
        let name = HeaderName::from_static("x-count");
        assert_eq!(apply(header::<u32>(name), "count", &mut ctx).unwrap(), 12);

        let err = apply(header::<u32>(HeaderName::from_static("x-missing")), "count", &mut ctx)
            .unwrap_err();
        assert_eq!(err.to_string(), "missing header x-missing");
    }

    #[test]
    fn test_query_values() {
        let mut ctx = test_context(Method::GET, "/?page=3&tag=a&tag=b&q=caf%C3%A9", "");
        assert_eq!(apply(query_value::<u32>("page"), "page", &mut ctx).unwrap(), 3);
        assert_eq!(
            apply(query_value::<String>("q"), "q", &mut ctx).unwrap(),
            "café"
        );
        assert_eq!(
            apply(query_value::<String>("tag"), "tag", &mut ctx)
                .unwrap_err()
                .to_string(),
            "expected 1 value for query parameter tag, got 2"
        );
        assert_eq!(
            apply(query_value::<u32>("size"), "size", &mut ctx)
                .unwrap_err()
                .to_string(),
            "no value for query parameter size"
        );
        assert_eq!(
            apply(optional_query_value::<u32>("size"), "size", &mut ctx).unwrap(),
            None
        );
    }

    #[test]
    fn test_repeated_query_collects_in_order() {
        let mut ctx = test_context(Method::GET, "/?tag=b&page=1&tag=a&n=1&n=x", "");
        assert_eq!(
            apply(query_values::<String>("tag"), "tags", &mut ctx).unwrap(),
            vec!["b", "a"]
        );
        assert!(
            apply(query_values::<u32>("size"), "sizes", &mut ctx)
                .unwrap()
                .is_empty()
        );
        assert!(apply(query_values::<u32>("n"), "n", &mut ctx).is_err());
    }

    #[test]
    fn test_closable_request_value_returns_closer() {
        let option = closable_request_value(|ctx: &RequestContext, value: &mut String| {
            *value = ctx.uri().path().to_string();
            let closer: Closer = Box::new(|_| Err("close failed".into()));
            Ok(closer)
        });
        let modifier = compose(&[option], &mut Route::new(), &info::<String>("v")).unwrap();
        let mut ctx = test_context(Method::GET, "/x", "");
        let mut value = String::new();
        let closer = modifier(&mut ctx, &mut value).unwrap().unwrap();
        assert_eq!(value, "/x");
        assert_eq!(closer(None).unwrap_err().to_string(), "close failed");
    }
}
