//! Point windows: keep recently dropped points around a "hit" point.
//!
//! A script registers the current point with `point_window(before, after,
//! tag_keys)`. Points are grouped by the values of `tag_keys`. Each group keeps
//! up to `before` dropped points; when a run calls `window_hit()`, the group
//! releases them with the drop flag cleared and also releases the next `after`
//! points that arrive in the group. Released points are collected with
//! [`WindowPool::take_released`].

use crate::point::Point;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Registration made by a single run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest {
    pub before: usize,
    pub after: usize,
    /// Values of the grouping tags, in the order the keys were given
    pub group: Vec<String>,
    pub hit: bool,
}

#[derive(Default)]
struct Group {
    ring: VecDeque<Point>,
    remaining_after: usize,
}

#[derive(Default)]
struct Inner {
    groups: HashMap<Vec<String>, Group>,
    released: Vec<Point>,
    stopped: bool,
}

#[derive(Default)]
pub struct WindowPool {
    inner: Mutex<Inner>,
}

fn release(mut point: Point) -> Point {
    point.mark_drop(false);
    point
}

impl WindowPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a point after its run finished, dropped or not.
    pub fn move_point(&self, req: &WindowRequest, point: Point) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.stopped {
            return;
        }
        let Inner {
            groups, released, ..
        } = &mut *inner;
        let group = groups.entry(req.group.clone()).or_default();

        if req.hit {
            released.extend(group.ring.drain(..).map(release));
            group.remaining_after = req.after;
            if point.dropped() {
                released.push(release(point));
            }
            return;
        }

        if group.remaining_after > 0 {
            group.remaining_after -= 1;
            if point.dropped() {
                released.push(release(point));
            }
            return;
        }

        if point.dropped() && req.before > 0 {
            group.ring.push_back(point);
            while group.ring.len() > req.before {
                group.ring.pop_front();
            }
        }
    }

    pub fn take_released(&self) -> Vec<Point> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut inner.released)
    }

    /// Number of points held back across all groups
    pub fn pending(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.groups.values().map(|g| g.ring.len()).sum()
    }

    /// Discard held points and ignore further observations
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.groups.clear();
        inner.released.clear();
        inner.stopped = true;
    }
}

impl std::fmt::Debug for WindowPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowPool")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;

    fn pt(msg: &str, dropped: bool) -> Point {
        let mut p = Point::new("log", Category::Logging).with_field("message", msg);
        p.mark_drop(dropped);
        p
    }

    fn req(hit: bool) -> WindowRequest {
        WindowRequest {
            before: 2,
            after: 1,
            group: vec!["web-1".into()],
            hit,
        }
    }

    fn messages(points: &[Point]) -> Vec<String> {
        points
            .iter()
            .map(|p| p.get("message").unwrap().0.to_string())
            .collect()
    }

    #[test]
    fn test_hit_releases_before_and_after() {
        let pool = WindowPool::new();
        for m in ["a", "b", "c"] {
            pool.move_point(&req(false), pt(m, true));
        }
        assert_eq!(pool.pending(), 2);
        assert!(pool.take_released().is_empty());

        pool.move_point(&req(true), pt("hit", false));
        pool.move_point(&req(false), pt("d", true));
        pool.move_point(&req(false), pt("e", true));

        let released = pool.take_released();
        assert_eq!(messages(&released), vec!["b", "c", "d"]);
        assert!(released.iter().all(|p| !p.dropped()));
        assert_eq!(pool.pending(), 1);
    }

    #[test]
    fn test_groups_are_independent() {
        let pool = WindowPool::new();
        let other = WindowRequest {
            group: vec!["web-2".into()],
            ..req(false)
        };
        pool.move_point(&other, pt("x", true));
        pool.move_point(&req(true), pt("hit", false));
        assert!(pool.take_released().is_empty());
        assert_eq!(pool.pending(), 1);
    }

    #[test]
    fn test_undropped_points_are_not_held() {
        let pool = WindowPool::new();
        pool.move_point(&req(false), pt("kept", false));
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_stop() {
        let pool = WindowPool::new();
        pool.move_point(&req(false), pt("a", true));
        pool.stop();
        pool.move_point(&req(false), pt("b", true));
        assert_eq!(pool.pending(), 0);
    }
}
