//! Weighted candidate lists for motion nodes.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How a motion node picks its next clip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    #[default]
    Randomize,
    RandomizeNoRepeat,
    Sequential,
}

pub const DEFAULT_MOTION_WEIGHT: f32 = 1.0;

/// Ordered `(motion id, cumulative weight)` pairs.
///
/// Cumulative weights are non-decreasing; the weight of entry `i` is
/// `cum[i] - cum[i - 1]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightedMotionList {
    entries: Vec<(String, f32)>,
}

impl WeightedMotionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from plain ids, each with the default weight.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::new();
        for id in ids {
            list.add_motion(id, DEFAULT_MOTION_WEIGHT);
        }
        list
    }

    /// Append a candidate. Negative weights count as zero.
    pub fn add_motion(&mut self, id: impl Into<String>, weight: f32) {
        let cumulative = self.total_weight() + weight.max(0.0);
        self.entries.push((id.into(), cumulative));
    }

    pub fn remove_motion(&mut self, id: &str) -> bool {
        let Some(pos) = self.entries.iter().position(|(m, _)| m == id) else {
            return false;
        };
        let removed = self.weight(pos);
        self.entries.remove(pos);
        for (_, cum) in self.entries.iter_mut().skip(pos) {
            *cum -= removed;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, f32)] {
        &self.entries
    }

    pub fn motion_id(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|(id, _)| id.as_str())
    }

    pub fn total_weight(&self) -> f32 {
        self.entries.last().map_or(0.0, |(_, c)| *c)
    }

    pub fn weight(&self, index: usize) -> f32 {
        let hi = self.entries.get(index).map_or(0.0, |(_, c)| *c);
        let lo = if index == 0 {
            0.0
        } else {
            self.entries.get(index - 1).map_or(0.0, |(_, c)| *c)
        };
        hi - lo
    }

    /// First index whose cumulative weight exceeds `value`; the last index if none does.
    pub fn find_cumulative_index(&self, value: f32) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }
        Some(
            self.entries
                .iter()
                .position(|(_, cum)| value < *cum)
                .unwrap_or(self.entries.len() - 1),
        )
    }

    /// Choose the next candidate given the previously active one.
    pub fn pick<R: Rng + ?Sized>(
        &self,
        mode: IndexMode,
        previous: Option<usize>,
        rng: &mut R,
    ) -> Option<usize> {
        match self.entries.len() {
            0 => None,
            1 => Some(0),
            n => match (mode, previous) {
                (IndexMode::Sequential, Some(prev)) => Some((prev + 1) % n),
                (IndexMode::Sequential, None) => Some(0),
                (IndexMode::RandomizeNoRepeat, Some(prev)) if prev < n => {
                    Some(self.pick_excluding(prev, rng))
                }
                _ => self.pick_any(rng),
            },
        }
    }

    fn pick_any<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        let value = rng.gen::<f32>() * self.total_weight();
        self.find_cumulative_index(value)
    }

    /// Draw over the total weight minus `excluded`'s weight, mapped onto the remaining
    /// buckets in their original order.
    fn pick_excluding<R: Rng + ?Sized>(&self, excluded: usize, rng: &mut R) -> usize {
        let n = self.entries.len();
        let before = if excluded == 0 {
            0.0
        } else {
            self.entries[excluded - 1].1
        };
        let after = self.entries[excluded].1;
        let range = self.total_weight() - (after - before);
        if range <= 0.0 {
            return (excluded + 1) % n;
        }
        let value = rng.gen::<f32>() * range;
        let remapped = if value >= before {
            value - before + after
        } else {
            value
        };
        match self.find_cumulative_index(remapped) {
            Some(i) if i != excluded && self.weight(i) > 0.0 => i,
            // float edge: land on the nearest remaining bucket with weight
            _ => (1..n)
                .map(|step| (excluded + step) % n)
                .find(|&i| self.weight(i) > 0.0)
                .unwrap_or((excluded + 1) % n),
        }
    }
}
