//! Aggregation buckets fed by `agg_create` / `agg_metric`.
//!
//! A bucket groups observations by a set of tag values and keeps one
//! accumulator per output field. It flushes when it has seen `count`
//! observations or when `interval` has elapsed since its last flush, turning
//! every group into a Metric point named after the bucket.

use crate::point::{Point, Value};
use crate::types::Category;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFn {
    Avg,
    Sum,
    Min,
    Max,
    Count,
    First,
    Last,
}

impl FromStr for AggFn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "avg" => AggFn::Avg,
            "sum" => AggFn::Sum,
            "min" => AggFn::Min,
            "max" => AggFn::Max,
            "count" => AggFn::Count,
            "first" => AggFn::First,
            "last" => AggFn::Last,
            other => return Err(format!("unknown aggregate function `{}`", other)),
        })
    }
}

#[derive(Debug, Clone)]
struct Acc {
    func: AggFn,
    sum: f64,
    n: u64,
    min: f64,
    max: f64,
    first: Option<f64>,
    last: f64,
}

impl Acc {
    fn new(func: AggFn) -> Self {
        Self {
            func,
            sum: 0.0,
            n: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            first: None,
            last: 0.0,
        }
    }

    fn observe(&mut self, v: f64) {
        self.sum += v;
        self.n += 1;
        self.min = self.min.min(v);
        self.max = self.max.max(v);
        self.first.get_or_insert(v);
        self.last = v;
    }

    fn result(&self) -> Value {
        match self.func {
            AggFn::Count => Value::Int(self.n as i64),
            _ if self.n == 0 => Value::Nil,
            AggFn::Avg => Value::Float(self.sum / self.n as f64),
            AggFn::Sum => Value::Float(self.sum),
            AggFn::Min => Value::Float(self.min),
            AggFn::Max => Value::Float(self.max),
            AggFn::First => Value::Float(self.first.unwrap_or_default()),
            AggFn::Last => Value::Float(self.last),
        }
    }
}

#[derive(Debug, Default)]
struct Group {
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, Acc>,
}

#[derive(Debug)]
struct Bucket {
    interval: Duration,
    max_count: usize,
    seen: usize,
    last_flush: Instant,
    groups: BTreeMap<Vec<String>, Group>,
}

impl Bucket {
    fn due(&self, now: Instant) -> bool {
        (self.max_count > 0 && self.seen >= self.max_count)
            || (!self.interval.is_zero() && now.duration_since(self.last_flush) >= self.interval)
    }

    fn flush(&mut self, name: &str, now: Instant, out: &mut Vec<Point>) {
        for (_, group) in std::mem::take(&mut self.groups) {
            let mut pt = Point::new(name, Category::Metric);
            for (k, v) in group.tags {
                pt = pt.with_tag(k, v);
            }
            for (k, acc) in group.fields {
                pt = pt.with_field(k, acc.result());
            }
            out.push(pt);
        }
        self.seen = 0;
        self.last_flush = now;
    }
}

#[derive(Default)]
struct Inner {
    buckets: HashMap<String, Bucket>,
    released: Vec<Point>,
    stopped: bool,
}

/// Aggregation buckets of one script
#[derive(Default)]
pub struct AggBuckets {
    inner: Mutex<Inner>,
}

impl AggBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bucket unless it already exists. Returns false once stopped.
    pub fn create(&self, name: &str, interval: Duration, max_count: usize) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.stopped {
            return false;
        }
        inner
            .buckets
            .entry(name.to_string())
            .or_insert_with(|| Bucket {
                interval,
                max_count,
                seen: 0,
                last_flush: Instant::now(),
                groups: BTreeMap::new(),
            });
        true
    }

    /// Record one observation. Returns false if the bucket does not exist.
    pub fn observe(
        &self,
        bucket: &str,
        field: &str,
        func: AggFn,
        tags: BTreeMap<String, String>,
        value: f64,
    ) -> bool {
        self.observe_at(bucket, field, func, tags, value, Instant::now())
    }

    fn observe_at(
        &self,
        bucket: &str,
        field: &str,
        func: AggFn,
        tags: BTreeMap<String, String>,
        value: f64,
        now: Instant,
    ) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Inner {
            buckets, released, ..
        } = &mut *inner;
        let Some(b) = buckets.get_mut(bucket) else {
            return false;
        };

        let key: Vec<String> = tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        let group = b.groups.entry(key).or_insert_with(|| Group {
            tags,
            fields: BTreeMap::new(),
        });
        group
            .fields
            .entry(field.to_string())
            .or_insert_with(|| Acc::new(func))
            .observe(value);
        b.seen += 1;

        if b.due(now) {
            b.flush(bucket, now, released);
        }
        true
    }

    /// Flush buckets whose interval elapsed, then hand out everything released
    pub fn take_released(&self) -> Vec<Point> {
        self.take_released_at(Instant::now())
    }

    fn take_released_at(&self, now: Instant) -> Vec<Point> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Inner {
            buckets, released, ..
        } = &mut *inner;
        for (name, b) in buckets.iter_mut() {
            if !b.groups.is_empty() && b.due(now) {
                b.flush(name, now, released);
            }
        }
        std::mem::take(released)
    }

    /// Flush everything pending and reject further buckets
    pub fn stop(&self) -> Vec<Point> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let Inner {
            buckets,
            released,
            stopped,
        } = &mut *inner;
        for (name, mut b) in buckets.drain() {
            b.flush(&name, now, released);
        }
        *stopped = true;
        std::mem::take(released)
    }
}

impl std::fmt::Debug for AggBuckets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("AggBuckets")
            .field("buckets", &inner.buckets.len())
            .finish()
    }
}
