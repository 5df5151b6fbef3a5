use std::time::{Duration, Instant};

/// A value together with the wall-clock time it took to produce.
#[derive(Debug)]
pub(crate) struct Timed<T> {
    pub(crate) value: T,
    pub(crate) elapsed: Duration,
}

/// Runs `f` and records how long it took.
pub(crate) fn timed<T>(f: impl FnOnce() -> T) -> Timed<T> {
    let start = Instant::now();
    let value = f();
    Timed {
        value,
        elapsed: start.elapsed(),
    }
}

/// Formats a duration the way the observability headers expect (`1.2ms`).
pub(crate) fn format_millis(duration: Duration) -> String {
    format!("{:.1}ms", duration.as_secs_f64() * 1000.0)
}

/// Size ratio `before / after`, or 1.0 when nothing came out.
pub(crate) fn ratio(before: usize, after: usize) -> f64 {
    if after == 0 {
        1.0
    } else {
        before as f64 / after as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_returns_value() {
        let timed = timed(|| 40 + 2);
        assert_eq!(timed.value, 42);
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(Duration::from_micros(1300)), "1.3ms");
        assert_eq!(format_millis(Duration::ZERO), "0.0ms");
    }

    #[test]
    fn test_ratio() {
        assert_eq!(ratio(100, 25), 4.0);
        assert_eq!(ratio(100, 0), 1.0);
    }
}
