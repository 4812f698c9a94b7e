//! Automation envelopes: breakpoint curves over beats that modulate a
//! route's volume or pan.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationTarget {
    Volume,
    Pan,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutomationPoint {
    #[serde(alias = "time")]
    pub beat: f64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutomationEnvelope {
    pub target: AutomationTarget,
    /// Sorted by beat; non-finite points are dropped.
    points: Vec<AutomationPoint>,
    pub enabled: bool,
}

impl AutomationEnvelope {
    pub fn new(target: AutomationTarget, points: Vec<AutomationPoint>, enabled: bool) -> Self {
        let mut env = AutomationEnvelope {
            target,
            points: Vec::new(),
            enabled,
        };
        env.set_points(points);
        env
    }

    pub fn set_points(&mut self, mut points: Vec<AutomationPoint>) {
        points.retain(|p| p.beat.is_finite() && p.value.is_finite());
        points.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        self.points = points;
    }

    pub fn points(&self) -> &[AutomationPoint] {
        &self.points
    }

    /// Value at `beat`: linear between points, held flat outside them.
    /// `None` when there are no points.
    pub fn value_at(&self, beat: f64) -> Option<f64> {
        let first = self.points.first()?;
        if beat <= first.beat {
            return Some(first.value);
        }
        let upper = self.points.partition_point(|p| p.beat <= beat);
        let Some(b) = self.points.get(upper) else {
            return self.points.last().map(|p| p.value);
        };
        let a = self.points[upper - 1];
        let span = b.beat - a.beat;
        if span <= 0.0 {
            return Some(b.value);
        }
        Some(a.value + (b.value - a.value) * (beat - a.beat) / span)
    }
}
