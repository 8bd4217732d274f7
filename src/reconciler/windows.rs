use tracing::debug;

use crate::models::common::Window;
use crate::models::errors::ReconcileError;

/// Splits `[from, to]` into consecutive windows of at most `max_window_size` blocks.
#[derive(Debug, Clone)]
pub struct Windows {
    from: u64,
    to: u64,
    max_window_size: u64,
    next_start: u64,
    yielded: u128,
    total: u128,
    done: bool,
}

impl Windows {
    pub fn new(from: u64, to: u64, max_window_size: u64) -> Result<Self, ReconcileError> {
        if from > to {
            return Err(ReconcileError::InvalidRange { from, to });
        }
        if max_window_size == 0 {
            return Err(ReconcileError::InvalidWindowSize);
        }

        Ok(Self {
            from,
            to,
            max_window_size,
            next_start: from,
            yielded: 0,
            // 0..=u64::MAX in single blocks is 2^64 windows
            total: u128::from((to - from) / max_window_size) + 1,
            done: false,
        })
    }

    /// Number of windows the full range splits into.
    pub fn total(&self) -> u128 {
        self.total
    }

    pub fn yielded(&self) -> u128 {
        self.yielded
    }

    /// Rewinds to the first window.
    pub fn reset(&mut self) {
        self.next_start = self.from;
        self.yielded = 0;
        self.done = false;
    }
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let start = self.next_start;
        let end = start
            .saturating_add(self.max_window_size - 1)
            .min(self.to);
        self.yielded += 1;
        // The last window may end at u64::MAX, so the next start is only advanced while more remain
        if end == self.to {
            self.done = true;
        } else {
            self.next_start = end + 1;
        }

        if self.yielded % 100 == 0 {
            debug!("Windowed {}/{} ranges", self.yielded, self.total);
        }

        Some(Window::new(start, end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.total - self.yielded) {
            Ok(remaining) => (remaining, Some(remaining)),
            Err(_) => (usize::MAX, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(from: u64, to: u64, size: u64) -> Vec<Window> {
        Windows::new(from, to, size).unwrap().collect()
    }

    #[test]
    fn splits_at_provider_limit() {
        let windows = collect(1_000_000, 1_000_650, 300);
        assert_eq!(
            windows,
            vec![
                Window::new(1_000_000, 1_000_299),
                Window::new(1_000_300, 1_000_599),
                Window::new(1_000_600, 1_000_650),
            ]
        );
    }

    #[test]
    fn single_block_range() {
        assert_eq!(collect(42, 42, 300), vec![Window::new(42, 42)]);
    }

    #[test]
    fn exact_boundary() {
        let windows = collect(100, 199, 50);
        assert_eq!(windows, vec![Window::new(100, 149), Window::new(150, 199)]);
    }

    #[test]
    fn window_size_one() {
        let windows = collect(7, 9, 1);
        assert_eq!(
            windows,
            vec![Window::new(7, 7), Window::new(8, 8), Window::new(9, 9)]
        );
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(matches!(
            Windows::new(200, 100, 50),
            Err(ReconcileError::InvalidRange { from: 200, to: 100 })
        ));
    }

    #[test]
    fn rejects_zero_window_size() {
        assert!(matches!(
            Windows::new(1, 100, 0),
            Err(ReconcileError::InvalidWindowSize)
        ));
    }

    #[test]
    fn reaches_end_of_u64_without_overflow() {
        let windows = collect(u64::MAX - 4, u64::MAX, 3);
        assert_eq!(
            windows,
            vec![
                Window::new(u64::MAX - 4, u64::MAX - 2),
                Window::new(u64::MAX - 1, u64::MAX),
            ]
        );
    }

    #[test]
    fn full_u64_range_in_single_blocks() {
        let mut windows = Windows::new(0, u64::MAX, 1).unwrap();
        assert_eq!(windows.total(), u128::from(u64::MAX) + 1);

        let first: Vec<Window> = windows.by_ref().take(3).collect();
        assert_eq!(
            first,
            vec![Window::new(0, 0), Window::new(1, 1), Window::new(2, 2)]
        );
        assert_eq!(windows.yielded(), 3);

        // Remaining count exceeds usize on 64-bit targets
        let (lower, upper) = windows.size_hint();
        assert!(lower > 0);
        if usize::BITS <= 64 {
            assert_eq!((lower, upper), (usize::MAX, None));
        }
    }

    #[test]
    fn whole_u64_range_in_one_window() {
        let windows = collect(0, u64::MAX, u64::MAX);
        assert_eq!(
            windows,
            vec![Window::new(0, u64::MAX - 1), Window::new(u64::MAX, u64::MAX)]
        );
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut windows = Windows::new(0, 100, 50).unwrap();
        assert_eq!(windows.next(), Some(Window::new(0, 49)));
        assert_eq!(windows.yielded(), 1);

        windows.reset();

        assert_eq!(windows.yielded(), 0);
        assert_eq!(windows.collect::<Vec<_>>().len(), 3);
    }

    #[test]
    fn windows_cover_range_exactly() {
        for from in [0u64, 1, 17, 1_000_000] {
            for span in [0u64, 1, 2, 299, 300, 301, 599, 600, 1_234] {
                for size in [1u64, 2, 7, 300] {
                    let to = from + span;
                    let iter = Windows::new(from, to, size).unwrap();
                    let expected = (to - from + 1).div_ceil(size);
                    assert_eq!(iter.total(), u128::from(expected));
                    assert_eq!(iter.size_hint().0 as u64, expected);

                    let windows: Vec<Window> = iter.collect();
                    assert_eq!(windows.len() as u64, expected);
                    assert_eq!(windows.first().unwrap().start, from);
                    assert_eq!(windows.last().unwrap().end, to);
                    for window in &windows {
                        assert!(window.start <= window.end);
                        assert!(window.end - window.start < size);
                    }
                    for pair in windows.windows(2) {
                        assert_eq!(pair[0].end + 1, pair[1].start);
                    }
                }
            }
        }
    }
}
