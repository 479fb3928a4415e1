//! Test data builders for creating test objects

use pointflow::{Category, Point};
use std::collections::HashMap;

/// Builder for the `name -> source` maps handed to script stores
#[derive(Default)]
pub struct ScriptSetBuilder {
    scripts: HashMap<String, String>,
}

impl ScriptSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, name: &str, source: &str) -> Self {
        self.scripts.insert(name.to_string(), source.to_string());
        self
    }

    pub fn build(self) -> HashMap<String, String> {
        self.scripts
    }
}

/// Logging point carrying `msg` in `message`
pub fn log_point(name: &str, msg: &str) -> Point {
    Point::new(name, Category::Logging).with_field("message", msg)
}

/// `n` logging points named `p0..pn`
pub fn log_points(n: usize) -> Vec<Point> {
    (0..n).map(|i| log_point(&format!("p{}", i), "m")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_set_builder() {
        let scripts = ScriptSetBuilder::new()
            .script("a.p", "x = 1")
            .script("b.p", "y = 2")
            .build();

        assert_eq!(scripts.len(), 2);
        assert_eq!(scripts["a.p"], "x = 1");
    }
}
