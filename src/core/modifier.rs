//! Field options, field modifiers and the cleanup stack that releases what
//! modifiers acquire.
//!
//! A [`FieldOption`] runs once per field at registration time and yields a
//! [`FieldModifier`]. Several options bound under one name or type are
//! compiled in order and composed into a single modifier by [`compose`].
//! At request time the composed modifier runs its parts in order, stops at
//! the first error and releases what the field already acquired. Panics are
//! caught and surface as [`Panicked`] errors.
use std::{
    any::{Any, type_name},
    error::Error,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use crate::core::{
    error::{BoxError, Panicked, RegistrationError, RequestError},
    route::{RequestContext, Route},
    schema::TypeTag,
};

/// The terminal error of a request as seen by a cleanup when it runs.
pub type Outcome<'a> = Option<&'a (dyn Error + Send + Sync + 'static)>;

/// Release operation registered by a field modifier.
pub type Closer = Box<dyn FnOnce(Outcome<'_>) -> Result<(), BoxError> + Send>;

/// Request-time population of a field of type `T`.
pub type FieldModifier<T> =
    Box<dyn Fn(&mut RequestContext, &mut T) -> Result<Option<Closer>, BoxError> + Send + Sync>;

pub(crate) type ErasedModifier = Box<
    dyn Fn(&mut RequestContext, &mut (dyn Any + Send)) -> Result<Option<Closer>, BoxError>
        + Send
        + Sync,
>;

pub(crate) type ErasedOption =
    Arc<dyn Fn(&mut Route, &FieldInfo) -> Result<ErasedModifier, RegistrationError> + Send + Sync>;

type Compile<T> = dyn Fn(&mut Route, &FieldInfo) -> Result<Option<FieldModifier<T>>, RegistrationError>
    + Send
    + Sync;

/// Name and declared type of the field an option is compiled for.
#[derive(Debug, Clone, Copy)]
pub struct FieldInfo {
    pub name: &'static str,
    pub tag: TypeTag,
}

/// Registration-time strategy populating a field of type `T`.
pub struct FieldOption<T> {
    compile: Arc<Compile<T>>,
}

impl<T> Clone for FieldOption<T> {
    fn clone(&self) -> Self {
        Self {
            compile: Arc::clone(&self.compile),
        }
    }
}

impl<T> fmt::Debug for FieldOption<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldOption<{}>", type_name::<T>())
    }
}

impl<T: 'static> FieldOption<T> {
    /// Build an option from its compile step. Returning `Ok(None)` adds no
    /// request-time work for this option.
    pub fn new<F>(compile: F) -> Self
    where
        F: Fn(&mut Route, &FieldInfo) -> Result<Option<FieldModifier<T>>, RegistrationError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            compile: Arc::new(compile),
        }
    }

    /// Build an option that reserves nothing at registration and runs
    /// `modifier` for every request.
    pub fn from_modifier<F>(modifier: F) -> Self
    where
        F: Fn(&mut RequestContext, &mut T) -> Result<Option<Closer>, BoxError>
            + Clone
            + Send
            + Sync
            + 'static,
    {
        Self::new(move |_, _| Ok(Some(Box::new(modifier.clone()) as FieldModifier<T>)))
    }

    pub(crate) fn compile(
        &self,
        route: &mut Route,
        field: &FieldInfo,
    ) -> Result<Option<FieldModifier<T>>, RegistrationError> {
        (self.compile)(route, field)
    }
}

/// LIFO stack of release guards acquired while serving one request or field.
#[derive(Default)]
pub struct CleanupStack {
    guards: Vec<Closer>,
}

impl fmt::Debug for CleanupStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupStack")
            .field("guards", &self.guards.len())
            .finish()
    }
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, closer: Closer) {
        self.guards.push(closer);
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Release every guard in reverse acquisition order, handing each the
    /// same `outcome`. Every guard runs; the first error returned (or panic
    /// raised) is reported.
    pub fn release_all(self, outcome: Outcome<'_>) -> Result<(), BoxError> {
        let mut first = None;
        for guard in self.guards.into_iter().rev() {
            if let Err(err) = run_guard(guard, outcome) {
                if first.is_none() {
                    first = Some(err);
                } else {
                    tracing::warn!(error = %err, "cleanup failed after an earlier cleanup error");
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Release every guard in reverse acquisition order against the
    /// request's terminal error. A failing guard becomes the terminal error
    /// only if none was set yet; later guards see the updated value.
    pub fn unwind(mut self, terminal: &mut Option<RequestError>) {
        while let Some(guard) = self.guards.pop() {
            let outcome = terminal
                .as_ref()
                .map(|err| err as &(dyn Error + Send + Sync + 'static));
            let Err(err) = run_guard(guard, outcome) else {
                continue;
            };
            crate::metrics::increment_cleanup_failures();
            if terminal.is_none() {
                *terminal = Some(RequestError::Cleanup(err));
            } else {
                tracing::warn!(error = %err, "cleanup failed after the request already failed");
            }
        }
    }

    /// Fold the stack into a single closer, `None` when nothing was acquired.
    pub fn into_closer(mut self) -> Option<Closer> {
        match self.guards.len() {
            0 => None,
            1 => self.guards.pop(),
            _ => Some(Box::new(move |outcome: Outcome<'_>| self.release_all(outcome))),
        }
    }
}

fn run_guard(guard: Closer, outcome: Outcome<'_>) -> Result<(), BoxError> {
    match catch_unwind(AssertUnwindSafe(|| guard(outcome))) {
        Ok(result) => result,
        Err(payload) => Err(Box::new(Panicked::from_payload(payload))),
    }
}

/// Compile `options` for one field and compose them into a single erased
/// modifier.
///
/// Options compile in order against the shared route cursor; the first
/// failure aborts. The field's declared type must be `T`.
pub(crate) fn compose<T: Any + Send>(
    options: &[FieldOption<T>],
    route: &mut Route,
    field: &FieldInfo,
) -> Result<ErasedModifier, RegistrationError> {
    if field.tag != TypeTag::of::<T>() {
        return Err(RegistrationError::TypeMismatch {
            field: field.name.to_string(),
            expected: type_name::<T>(),
            actual: field.tag.name(),
        });
    }

    let mut modifiers = Vec::with_capacity(options.len());
    for option in options {
        if let Some(modifier) = option.compile(route, field)? {
            modifiers.push(modifier);
        }
    }
    modifiers.shrink_to_fit();

    let name = field.name;
    let composed: ErasedModifier = Box::new(move |ctx, slot| {
        let value = slot
            .downcast_mut::<T>()
            .ok_or_else(|| format!("field {name} does not hold a {}", type_name::<T>()))?;
        run_modifiers(&modifiers, ctx, value)
    });
    Ok(composed)
}

fn run_modifiers<T>(
    modifiers: &[FieldModifier<T>],
    ctx: &mut RequestContext,
    value: &mut T,
) -> Result<Option<Closer>, BoxError> {
    let mut acquired = CleanupStack::new();
    for modifier in modifiers {
        let err: BoxError = match catch_unwind(AssertUnwindSafe(|| modifier(ctx, value))) {
            Ok(Ok(Some(closer))) => {
                acquired.push(closer);
                continue;
            }
            Ok(Ok(None)) => continue,
            Ok(Err(err)) => err,
            Err(payload) => Box::new(Panicked::from_payload(payload)),
        };
        if let Err(cleanup_err) = acquired.release_all(Some(&*err)) {
            tracing::warn!(error = %cleanup_err, "cleanup failed while unwinding a field");
        }
        return Err(err);
    }
    Ok(acquired.into_closer())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::Method;

    use super::*;
    use crate::core::route::test_context;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(log: &Log, label: &'static str) -> Closer {
        let log = Arc::clone(log);
        Box::new(move |outcome| {
            let seen = outcome.map_or("ok".to_string(), |e| e.to_string());
            log.lock().unwrap().push(format!("{label}:{seen}"));
            Ok(())
        })
    }

    fn acquiring(log: &Log, label: &'static str) -> FieldOption<String> {
        let log = Arc::clone(log);
        FieldOption::from_modifier(move |_ctx: &mut RequestContext, v: &mut String| {
            v.push_str(label);
            Ok(Some(recording(&log, label)))
        })
    }

    fn failing(message: &'static str) -> FieldOption<String> {
        FieldOption::from_modifier(move |_ctx: &mut RequestContext, _v: &mut String| {
            Err(message.into())
        })
    }

    fn info<T: Any>(name: &'static str) -> FieldInfo {
        FieldInfo {
            name,
            tag: TypeTag::of::<T>(),
        }
    }

    fn run(modifier: &ErasedModifier, value: &mut String) -> Result<Option<Closer>, BoxError> {
        let mut ctx = test_context(Method::GET, "/", "");
        modifier(&mut ctx, value)
    }

    #[test]
    fn test_modifiers_run_in_order_and_fold_closers() {
        let log = Log::default();
        let options = [acquiring(&log, "a"), acquiring(&log, "b"), acquiring(&log, "c")];
        let modifier = compose(&options, &mut Route::new(), &info::<String>("v")).unwrap();

        let mut value = String::new();
        let closer = run(&modifier, &mut value).unwrap().unwrap();
        assert_eq!(value, "abc");
        assert!(log.lock().unwrap().is_empty());

        closer(None).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["c:ok", "b:ok", "a:ok"]);
    }

    #[test]
    fn test_error_stops_field_and_releases_acquired() {
        let log = Log::default();
        let options = [
            acquiring(&log, "a"),
            acquiring(&log, "b"),
            failing("bad input"),
            acquiring(&log, "never"),
        ];
        let modifier = compose(&options, &mut Route::new(), &info::<String>("v")).unwrap();

        let mut value = String::new();
        let err = run(&modifier, &mut value).err().unwrap();
        assert_eq!(err.to_string(), "bad input");
        assert_eq!(value, "ab");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["b:bad input", "a:bad input"]
        );
    }

    #[test]
    fn test_panic_becomes_error_and_releases_acquired() {
        let log = Log::default();
        let panicking = FieldOption::from_modifier(|_: &mut RequestContext, _: &mut String| {
            panic!("modifier exploded")
        });
        let options = [acquiring(&log, "a"), panicking];
        let modifier = compose(&options, &mut Route::new(), &info::<String>("v")).unwrap();

        let err = run(&modifier, &mut String::new()).err().unwrap();
        assert_eq!(err.to_string(), "panic: modifier exploded");
        assert_eq!(*log.lock().unwrap(), vec!["a:panic: modifier exploded"]);
    }

    #[test]
    fn test_single_closer_is_returned_as_is() {
        let log = Log::default();
        let modifier =
            compose(&[acquiring(&log, "only")], &mut Route::new(), &info::<String>("v")).unwrap();
        let closer = run(&modifier, &mut String::new()).unwrap().unwrap();
        closer(None).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["only:ok"]);
    }

    #[test]
    fn test_no_closers_yields_none() {
        let modifier = compose(
            &[FieldOption::from_modifier(
                |_: &mut RequestContext, v: &mut String| {
                    v.push('x');
                    Ok(None)
                },
            )],
            &mut Route::new(),
            &info::<String>("v"),
        )
        .unwrap();
        assert!(run(&modifier, &mut String::new()).unwrap().is_none());
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let err = compose(&[failing("unused")], &mut Route::new(), &info::<i64>("count"))
            .err()
            .unwrap();
        assert!(matches!(err, RegistrationError::TypeMismatch { .. }));
    }

    #[test]
    fn test_compile_error_aborts() {
        let broken: FieldOption<String> =
            FieldOption::new(|_, field| Err(RegistrationError::Option {
                field: field.name.to_string(),
                source: "missing setting".into(),
            }));
        let err = compose(&[broken], &mut Route::new(), &info::<String>("v"))
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "compiling option for field v: missing setting"
        );
    }

    #[test]
    fn test_release_all_reports_first_error_and_runs_everything() {
        let log = Log::default();
        let mut stack = CleanupStack::new();
        stack.push(recording(&log, "first"));
        stack.push(Box::new(|_| Err("inner failure".into())));
        stack.push(Box::new(|_| Err("innermost failure".into())));
        stack.push(recording(&log, "last"));

        let err = stack.release_all(None).unwrap_err();
        assert_eq!(err.to_string(), "innermost failure");
        assert_eq!(*log.lock().unwrap(), vec!["last:ok", "first:ok"]);
    }

    #[test]
    fn test_unwind_threads_terminal_error() {
        let log = Log::default();
        let mut stack = CleanupStack::new();
        stack.push(recording(&log, "outer"));
        stack.push(Box::new(|_| Err("close failed".into())));
        stack.push(recording(&log, "inner"));

        let mut terminal = None;
        stack.unwind(&mut terminal);

        assert!(matches!(terminal, Some(RequestError::Cleanup(_))));
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "inner:ok",
                "outer:releasing request resources: close failed"
            ]
        );
    }

    #[test]
    fn test_unwind_keeps_existing_terminal_error() {
        let mut stack = CleanupStack::new();
        stack.push(Box::new(|_| panic!("closer panicked")));

        let mut terminal = Some(RequestError::NotFound);
        stack.unwind(&mut terminal);
        assert!(matches!(terminal, Some(RequestError::NotFound)));
    }
}
