//! Built-in pipeline operators.

use std::sync::Arc;

use super::{Observable, Observer, Operator, StreamError, Subscriber};

/// Transforms every value with `f`.
pub fn map<T, F>(f: F) -> Operator<T>
where
    T: Send + 'static,
    F: Fn(T) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Operator::new("map", move |source: Observable<T>| {
        let f = Arc::clone(&f);
        Observable::new(move |downstream: Subscriber<T>| {
            let parent = downstream.subscription().clone();
            let observer = MapObserver {
                downstream,
                f: Arc::clone(&f),
            };
            source.subscribe_linked(observer, &parent);
        })
    })
}

struct MapObserver<T, F> {
    downstream: Subscriber<T>,
    f: Arc<F>,
}

impl<T, F> Observer<T> for MapObserver<T, F>
where
    T: Send,
    F: Fn(T) -> T + Send + Sync,
{
    fn next(&mut self, value: T) {
        self.downstream.next((self.f)(value));
    }

    fn error(&mut self, error: StreamError) {
        self.downstream.error(error);
    }

    fn complete(&mut self) {
        self.downstream.complete();
    }
}

/// Passes through only the values matching `predicate`.
pub fn filter<T, P>(predicate: P) -> Operator<T>
where
    T: Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    Operator::new("filter", move |source: Observable<T>| {
        let predicate = Arc::clone(&predicate);
        Observable::new(move |downstream: Subscriber<T>| {
            let parent = downstream.subscription().clone();
            let observer = FilterObserver {
                downstream,
                predicate: Arc::clone(&predicate),
            };
            source.subscribe_linked(observer, &parent);
        })
    })
}

struct FilterObserver<T, P> {
    downstream: Subscriber<T>,
    predicate: Arc<P>,
}

impl<T, P> Observer<T> for FilterObserver<T, P>
where
    T: Send,
    P: Fn(&T) -> bool + Send + Sync,
{
    fn next(&mut self, value: T) {
        if (self.predicate)(&value) {
            self.downstream.next(value);
        }
    }

    fn error(&mut self, error: StreamError) {
        self.downstream.error(error);
    }

    fn complete(&mut self) {
        self.downstream.complete();
    }
}

/// Emits the first `count` values, then completes and unsubscribes from
/// the source.
pub fn take<T: Send + 'static>(count: usize) -> Operator<T> {
    Operator::new("take", move |source: Observable<T>| {
        Observable::new(move |mut downstream: Subscriber<T>| {
            if count == 0 {
                downstream.complete();
                return;
            }
            let parent = downstream.subscription().clone();
            let observer = TakeObserver {
                downstream,
                remaining: count,
            };
            source.subscribe_linked(observer, &parent);
        })
    })
}

struct TakeObserver<T> {
    downstream: Subscriber<T>,
    remaining: usize,
}

impl<T: Send> Observer<T> for TakeObserver<T> {
    fn next(&mut self, value: T) {
        if self.remaining == 0 {
            return;
        }
        self.remaining -= 1;
        self.downstream.next(value);
        if self.remaining == 0 {
            self.downstream.complete();
        }
    }

    fn error(&mut self, error: StreamError) {
        self.downstream.error(error);
    }

    fn complete(&mut self) {
        self.downstream.complete();
    }
}

/// Runs `effect` for every value without changing the stream.
pub fn tap<T, E>(effect: E) -> Operator<T>
where
    T: Send + 'static,
    E: Fn(&T) + Send + Sync + 'static,
{
    filter(move |value: &T| {
        effect(value);
        true
    })
    .renamed("tap")
}

impl<T> Operator<T> {
    fn renamed(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::super::{from_iter, throw_error, Notification};
    use super::*;
    use crate::compose::Direct;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn run(source: Observable<i32>, operator: &Operator<i32>) -> Vec<Notification<i32>> {
        let (tx, rx) = mpsc::channel();
        operator.apply(source).subscribe(tx);
        rx.try_iter().collect()
    }

    #[test]
    fn test_map_transforms_values() {
        let out = run(from_iter(vec![1, 2]), &map(|x: i32| x * 10));
        assert_eq!(
            out,
            vec![Notification::Next(10), Notification::Next(20), Notification::Completed]
        );
    }

    #[test]
    fn test_filter_drops_values() {
        let out = run(from_iter(1..=5), &filter(|x: &i32| x % 2 == 1));
        assert_eq!(
            out,
            vec![
                Notification::Next(1),
                Notification::Next(3),
                Notification::Next(5),
                Notification::Completed,
            ]
        );
    }

    #[test]
    fn test_take_stops_source_early() {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&produced);
        let source = from_iter(1..=100).pipe_with(&Direct, vec![tap(move |_: &i32| {
            counter.fetch_add(1, Ordering::SeqCst);
        })]);

        let out = run(source, &take(2));
        assert_eq!(
            out,
            vec![Notification::Next(1), Notification::Next(2), Notification::Completed]
        );
        assert_eq!(produced.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_take_zero_completes_immediately() {
        let out = run(from_iter(vec![1, 2]), &take(0));
        assert_eq!(out, vec![Notification::Completed]);
    }

    #[test]
    fn test_errors_pass_through() {
        let out = run(throw_error(StreamError::new("bad")), &map(|x: i32| x + 1));
        assert_eq!(out, vec![Notification::Error(StreamError::new("bad"))]);
    }

    #[test]
    fn test_tap_keeps_its_name() {
        assert_eq!(tap(|_: &i32| {}).name(), "tap");
    }
}
