//! Pipeline composition.
//!
//! Every `pipe` call goes through a [`Compose`] implementation. By default
//! that is [`Direct`], which simply applies the operators in order. Once
//! [`install`] has registered an instrumented composer, every later `pipe`
//! call is routed through it instead, so pipelines written against the
//! plain API are observed without code changes.

use std::fmt::{self, Debug};
use std::panic::Location;
use std::sync::OnceLock;

use crate::error::RuntimeError;
use crate::instrument::Instrumented;
use crate::stream::{Observable, Operator};

/// Source position of a composition call, one-based as captured.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl CallSite {
    pub fn new(file: &'static str, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }

    /// Captures the location of the nearest caller not marked
    /// `#[track_caller]`.
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self::new(location.file(), location.line(), location.column())
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Capability of turning a list of operators into one.
pub trait Compose: Send + Sync {
    fn compose<T>(&self, site: &CallSite, operators: Vec<Operator<T>>) -> Operator<T>
    where
        T: Debug + Send + 'static;
}

/// Applies operators left to right, unobserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl Compose for Direct {
    fn compose<T>(&self, _site: &CallSite, operators: Vec<Operator<T>>) -> Operator<T>
    where
        T: Debug + Send + 'static,
    {
        Operator::new("pipe", move |source: Observable<T>| {
            operators
                .iter()
                .fold(source, |observable, operator| operator.apply(observable))
        })
    }
}

static INSTALLED: OnceLock<Instrumented<Direct>> = OnceLock::new();

/// Routes every subsequent `pipe` call through `composer`.
///
/// # Errors
///
/// Returns `RuntimeError::AlreadyInstalled` if a composer was installed
/// before; the first one stays in place.
pub fn install(composer: Instrumented<Direct>) -> Result<(), RuntimeError> {
    INSTALLED
        .set(composer)
        .map_err(|_| RuntimeError::AlreadyInstalled)
}

/// Returns true once instrumentation is installed in this process.
pub fn is_installed() -> bool {
    INSTALLED.get().is_some()
}

impl<T: Debug + Send + 'static> Observable<T> {
    /// Composes `operators` onto this observable through the installed
    /// composer, or [`Direct`] if none is installed.
    #[track_caller]
    pub fn pipe(&self, operators: Vec<Operator<T>>) -> Observable<T> {
        let site = CallSite::caller();
        match INSTALLED.get() {
            Some(composer) => self.pipe_at(composer, &site, operators),
            None => self.pipe_at(&Direct, &site, operators),
        }
    }

    /// Composes through an explicit composer.
    #[track_caller]
    pub fn pipe_with<C: Compose>(&self, composer: &C, operators: Vec<Operator<T>>) -> Observable<T> {
        let site = CallSite::caller();
        self.pipe_at(composer, &site, operators)
    }

    /// Composes through an explicit composer as if called from `site`.
    pub fn pipe_at<C: Compose>(
        &self,
        composer: &C,
        site: &CallSite,
        operators: Vec<Operator<T>>,
    ) -> Observable<T> {
        composer.compose(site, operators).apply(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{from_iter, map, Notification};
    use std::sync::mpsc;

    #[test]
    fn test_caller_reports_this_file() {
        let site = CallSite::caller();
        assert!(site.file.ends_with("compose.rs"));
        assert!(site.line > 0);
        assert!(site.column > 0);
    }

    #[test]
    fn test_direct_applies_in_order() {
        let (tx, rx) = mpsc::channel();
        from_iter(vec![1])
            .pipe_with(&Direct, vec![map(|x: i32| x + 1), map(|x: i32| x * 10)])
            .subscribe(tx);
        let out: Vec<_> = rx.try_iter().collect();
        assert_eq!(out, vec![Notification::Next(20), Notification::Completed]);
    }

    #[test]
    fn test_pipe_without_install_is_direct() {
        let (tx, rx) = mpsc::channel();
        from_iter(vec![2, 3]).pipe(vec![map(|x: i32| x * x)]).subscribe(tx);
        let out: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            out,
            vec![Notification::Next(4), Notification::Next(9), Notification::Completed]
        );
    }

    #[test]
    fn test_empty_pipe_is_identity() {
        let (tx, rx) = mpsc::channel();
        from_iter(vec![7]).pipe_with(&Direct, Vec::new()).subscribe(tx);
        let out: Vec<_> = rx.try_iter().collect();
        assert_eq!(out, vec![Notification::Next(7), Notification::Completed]);
    }
}
