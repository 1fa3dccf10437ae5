//! Parameter space — declared search dimensions and concrete parameter sets.
//!
//! A [`ParameterSpace`] is validated once at construction (fail fast); every
//! [`ParameterSet`] produced from it holds exactly one in-bounds value per
//! declared spec. Discrete values always sit on the `min + k * step` lattice.
//!
//! Every dimension also has a continuous *axis* representation used by the
//! swarm and Bayesian searches: numeric specs map onto `[min, max]`,
//! categorical specs onto the index range `[0, n - 1]`.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;

/// Tolerance used when counting lattice points, so that `(max - min) / step`
/// landing a hair below an integer does not drop the last point.
const LATTICE_EPS: f64 = 1e-9;

/// Upper bound on lattice points of a single discrete spec.
pub const MAX_LATTICE_POINTS: f64 = u32::MAX as f64;

// ─── Specs ───────────────────────────────────────────────────────────

/// How a parameter's values are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// Numeric values on the lattice `min, min + step, ..., <= max`.
    Discrete,
    /// Any real value in `[min, max]`.
    Continuous,
    /// One of a fixed list of string choices.
    Categorical,
}

/// Declaration of one search dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

impl ParameterSpec {
    pub fn discrete(name: impl Into<String>, min: f64, max: f64, step: f64) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Discrete,
            min,
            max,
            step: Some(step),
            choices: None,
        }
    }

    pub fn continuous(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Continuous,
            min,
            max,
            step: None,
            choices: None,
        }
    }

    pub fn categorical<S: Into<String>>(
        name: impl Into<String>,
        choices: impl IntoIterator<Item = S>,
    ) -> Self {
        let choices: Vec<String> = choices.into_iter().map(Into::into).collect();
        let max = choices.len().saturating_sub(1) as f64;
        Self {
            name: name.into(),
            kind: ParameterKind::Categorical,
            min: 0.0,
            max,
            step: None,
            choices: Some(choices),
        }
    }

    /// Check the spec's own invariants.
    pub fn validate(&self) -> Result<(), SpaceError> {
        if self.name.trim().is_empty() {
            return Err(SpaceError::EmptyName);
        }
        match self.kind {
            ParameterKind::Categorical => {
                let choices = self.choices.as_deref().unwrap_or_default();
                if choices.is_empty() {
                    return Err(SpaceError::EmptyChoices {
                        name: self.name.clone(),
                    });
                }
                for (i, c) in choices.iter().enumerate() {
                    if choices[..i].contains(c) {
                        return Err(SpaceError::DuplicateChoice {
                            name: self.name.clone(),
                            choice: c.clone(),
                        });
                    }
                }
            }
            ParameterKind::Discrete | ParameterKind::Continuous => {
                if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
                    return Err(SpaceError::InvalidBounds {
                        name: self.name.clone(),
                        min: self.min,
                        max: self.max,
                    });
                }
                if self.kind == ParameterKind::Discrete {
                    match self.step {
                        Some(step) if step.is_finite() && step > 0.0 => {}
                        step => {
                            return Err(SpaceError::InvalidStep {
                                name: self.name.clone(),
                                step,
                            })
                        }
                    }
                    let points = (self.max - self.min) / self.step() + 1.0;
                    if points > MAX_LATTICE_POINTS {
                        return Err(SpaceError::LatticeTooLarge {
                            name: self.name.clone(),
                            points,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Discrete and continuous specs carry numeric values.
    pub fn is_numeric(&self) -> bool {
        self.kind != ParameterKind::Categorical
    }

    fn choices(&self) -> &[String] {
        self.choices.as_deref().unwrap_or_default()
    }

    fn step(&self) -> f64 {
        self.step.unwrap_or(1.0)
    }

    /// Highest lattice index for a discrete spec.
    fn max_lattice_index(&self) -> usize {
        (((self.max - self.min) / self.step()) + LATTICE_EPS).floor() as usize
    }

    /// Snap a numeric value into bounds (and onto the lattice for discrete specs).
    pub fn snap(&self, x: f64) -> f64 {
        let x = if x.is_nan() { self.min } else { x };
        let clamped = x.clamp(self.min, self.max);
        match self.kind {
            ParameterKind::Discrete => {
                let k = ((clamped - self.min) / self.step()).round() as usize;
                let k = k.min(self.max_lattice_index());
                self.min + k as f64 * self.step()
            }
            _ => clamped,
        }
    }

    /// All lattice values of a discrete spec.
    pub fn lattice(&self) -> Vec<f64> {
        (0..=self.max_lattice_index())
            .map(|k| self.min + k as f64 * self.step())
            .collect()
    }

    /// Values enumerated by a grid search.
    ///
    /// Continuous specs are sampled at `grid_steps` evenly spaced points that
    /// include both bounds; a single step yields the midpoint.
    pub fn grid_values(&self, grid_steps: usize) -> Vec<ParamValue> {
        match self.kind {
            ParameterKind::Discrete => self.lattice().into_iter().map(ParamValue::Number).collect(),
            ParameterKind::Continuous => {
                if grid_steps <= 1 || self.min == self.max {
                    let mid = if self.min == self.max {
                        self.min
                    } else {
                        (self.min + self.max) / 2.0
                    };
                    return vec![ParamValue::Number(mid)];
                }
                let width = self.max - self.min;
                (0..grid_steps)
                    .map(|i| {
                        let v = if i == grid_steps - 1 {
                            self.max
                        } else {
                            self.min + width * i as f64 / (grid_steps - 1) as f64
                        };
                        ParamValue::Number(v)
                    })
                    .collect()
            }
            ParameterKind::Categorical => self
                .choices()
                .iter()
                .map(|c| ParamValue::Choice(c.clone()))
                .collect(),
        }
    }

    /// Number of grid points for this dimension.
    pub fn grid_len(&self, grid_steps: usize) -> usize {
        match self.kind {
            ParameterKind::Discrete => self.max_lattice_index().saturating_add(1),
            ParameterKind::Continuous => {
                if self.min == self.max {
                    1
                } else {
                    grid_steps.max(1)
                }
            }
            ParameterKind::Categorical => self.choices().len(),
        }
    }

    /// Uniformly sample a value.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match self.kind {
            ParameterKind::Discrete => {
                let k = rng.gen_range(0..=self.max_lattice_index());
                ParamValue::Number(self.min + k as f64 * self.step())
            }
            ParameterKind::Continuous => {
                if self.min == self.max {
                    ParamValue::Number(self.min)
                } else {
                    ParamValue::Number(rng.gen_range(self.min..=self.max))
                }
            }
            ParameterKind::Categorical => {
                let idx = rng.gen_range(0..self.choices().len());
                ParamValue::Choice(self.choices()[idx].clone())
            }
        }
    }

    /// Whether `value` is a legal value for this spec.
    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self.kind, value) {
            (ParameterKind::Categorical, ParamValue::Choice(c)) => self.choices().contains(c),
            (ParameterKind::Continuous, ParamValue::Number(x)) => {
                x.is_finite() && *x >= self.min && *x <= self.max
            }
            (ParameterKind::Discrete, ParamValue::Number(x)) => {
                x.is_finite()
                    && *x >= self.min - LATTICE_EPS
                    && *x <= self.max + LATTICE_EPS
                    && (self.snap(*x) - x).abs() <= LATTICE_EPS * self.step().max(1.0)
            }
            _ => false,
        }
    }

    // ── Axis representation ──

    /// Bounds of the continuous axis for this dimension.
    pub fn axis_bounds(&self) -> (f64, f64) {
        match self.kind {
            ParameterKind::Categorical => (0.0, self.choices().len().saturating_sub(1) as f64),
            _ => (self.min, self.max),
        }
    }

    /// Position of a value on the axis.
    pub fn to_axis(&self, value: &ParamValue) -> f64 {
        match value {
            ParamValue::Number(x) => *x,
            ParamValue::Choice(c) => self
                .choices()
                .iter()
                .position(|x| x == c)
                .unwrap_or(0) as f64,
        }
    }

    /// Map an axis position back to a legal value (clamped, snapped, rounded).
    pub fn from_axis(&self, x: f64) -> ParamValue {
        match self.kind {
            ParameterKind::Categorical => {
                let (lo, hi) = self.axis_bounds();
                let x = if x.is_nan() { lo } else { x };
                let idx = x.clamp(lo, hi).round() as usize;
                ParamValue::Choice(self.choices()[idx].clone())
            }
            _ => ParamValue::Number(self.snap(x)),
        }
    }

    /// Width of the axis (zero for degenerate ranges).
    pub fn axis_width(&self) -> f64 {
        let (lo, hi) = self.axis_bounds();
        hi - lo
    }
}

// ─── Values & sets ───────────────────────────────────────────────────

/// A concrete value for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Choice(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(x) => Some(*x),
            ParamValue::Choice(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Choice(s) => Some(s),
            ParamValue::Number(_) => None,
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Number(x) => write!(f, "{x}"),
            ParamValue::Choice(s) => f.write_str(s),
        }
    }
}

/// Immutable mapping from parameter name to value.
///
/// Ordered by name, so serialization and fingerprints are stable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    values: BTreeMap<String, ParamValue>,
}

impl ParameterSet {
    /// Build a set without checking it against a space.
    ///
    /// Use [`ParameterSpace::make_set`] for caller-supplied values.
    pub fn from_values(values: BTreeMap<String, ParamValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    /// Numeric value of `name`, if present and numeric.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_f64)
    }

    /// Categorical value of `name`, if present and categorical.
    pub fn choice(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A copy of this set with one value replaced.
    pub fn with_value(&self, name: &str, value: ParamValue) -> Self {
        let mut values = self.values.clone();
        values.insert(name.to_string(), value);
        Self { values }
    }

    /// Content hash of the set (BLAKE3 over names and exact value bits).
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (name, value) in &self.values {
            hasher.update(name.as_bytes());
            hasher.update(&[0]);
            match value {
                ParamValue::Number(x) => {
                    hasher.update(b"n");
                    hasher.update(&x.to_bits().to_le_bytes());
                }
                ParamValue::Choice(s) => {
                    hasher.update(b"c");
                    hasher.update(s.as_bytes());
                }
            }
            hasher.update(&[0xff]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl std::fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

// ─── Space ───────────────────────────────────────────────────────────

/// A validated, ordered list of parameter specs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ParameterSpec>", into = "Vec<ParameterSpec>")]
pub struct ParameterSpace {
    specs: Vec<ParameterSpec>,
}

impl TryFrom<Vec<ParameterSpec>> for ParameterSpace {
    type Error = SpaceError;

    fn try_from(specs: Vec<ParameterSpec>) -> Result<Self, Self::Error> {
        Self::new(specs)
    }
}

impl From<ParameterSpace> for Vec<ParameterSpec> {
    fn from(space: ParameterSpace) -> Self {
        space.specs
    }
}

impl ParameterSpace {
    /// Validate every spec and name uniqueness.
    pub fn new(specs: Vec<ParameterSpec>) -> Result<Self, SpaceError> {
        if specs.is_empty() {
            return Err(SpaceError::Empty);
        }
        for (i, spec) in specs.iter().enumerate() {
            spec.validate()?;
            if specs[..i].iter().any(|s| s.name == spec.name) {
                return Err(SpaceError::DuplicateName(spec.name.clone()));
            }
        }
        Ok(Self { specs })
    }

    pub fn specs(&self) -> &[ParameterSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn spec(&self, name: &str) -> Option<&ParameterSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Validate caller-supplied values and build a set.
    pub fn make_set(
        &self,
        values: BTreeMap<String, ParamValue>,
    ) -> Result<ParameterSet, SpaceError> {
        let set = ParameterSet::from_values(values);
        self.check(&set)?;
        Ok(set)
    }

    /// Check that `set` holds exactly one legal value per spec.
    pub fn check(&self, set: &ParameterSet) -> Result<(), SpaceError> {
        for (name, _) in set.iter() {
            if self.spec(name).is_none() {
                return Err(SpaceError::UnknownParameter(name.clone()));
            }
        }
        for spec in &self.specs {
            let value = set
                .get(&spec.name)
                .ok_or_else(|| SpaceError::MissingValue(spec.name.clone()))?;
            if !spec.contains(value) {
                return Err(SpaceError::OutOfBounds {
                    name: spec.name.clone(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Total number of grid points, or `None` on overflow.
    pub fn grid_size(&self, grid_steps: usize) -> Option<usize> {
        self.specs
            .iter()
            .try_fold(1usize, |acc, s| acc.checked_mul(s.grid_len(grid_steps)))
    }

    /// Cartesian product of every dimension's grid values.
    ///
    /// Ordering is lexicographic in spec order (the last spec varies fastest),
    /// so the enumeration is deterministic for a given space.
    pub fn grid(&self, grid_steps: usize) -> Vec<ParameterSet> {
        let axes: Vec<Vec<ParamValue>> = self
            .specs
            .iter()
            .map(|s| s.grid_values(grid_steps))
            .collect();
        let total = axes.iter().map(Vec::len).product::<usize>();
        let mut sets = Vec::with_capacity(total);
        let mut idx = vec![0usize; axes.len()];

        for _ in 0..total {
            let values = self
                .specs
                .iter()
                .zip(axes.iter().zip(idx.iter()))
                .map(|(spec, (axis, &i))| (spec.name.clone(), axis[i].clone()))
                .collect();
            sets.push(ParameterSet::from_values(values));

            // Odometer increment, last axis fastest.
            for d in (0..axes.len()).rev() {
                idx[d] += 1;
                if idx[d] < axes[d].len() {
                    break;
                }
                idx[d] = 0;
            }
        }
        sets
    }

    /// Uniform random set.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterSet {
        let values = self
            .specs
            .iter()
            .map(|s| (s.name.clone(), s.sample(rng)))
            .collect();
        ParameterSet::from_values(values)
    }

    /// Axis coordinates of a set, in spec order.
    pub fn to_axes(&self, set: &ParameterSet) -> Vec<f64> {
        self.specs
            .iter()
            .map(|s| set.get(&s.name).map_or(s.axis_bounds().0, |v| s.to_axis(v)))
            .collect()
    }

    /// Build a legal set from axis coordinates (clamped, snapped, rounded).
    pub fn from_axes(&self, coords: &[f64]) -> ParameterSet {
        let values = self
            .specs
            .iter()
            .zip(coords.iter())
            .map(|(s, &x)| (s.name.clone(), s.from_axis(x)))
            .collect();
        ParameterSet::from_values(values)
    }

    /// Unit-cube coordinates of a set: each axis rescaled to `[0, 1]`.
    pub fn to_unit(&self, set: &ParameterSet) -> Vec<f64> {
        self.specs
            .iter()
            .zip(self.to_axes(set))
            .map(|(s, x)| {
                let (lo, _) = s.axis_bounds();
                let w = s.axis_width();
                if w > 0.0 {
                    ((x - lo) / w).clamp(0.0, 1.0)
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Inverse of [`to_unit`](Self::to_unit), snapping onto legal values.
    pub fn from_unit(&self, unit: &[f64]) -> ParameterSet {
        let coords: Vec<f64> = self
            .specs
            .iter()
            .zip(unit.iter())
            .map(|(s, &u)| {
                let (lo, _) = s.axis_bounds();
                lo + u.clamp(0.0, 1.0) * s.axis_width()
            })
            .collect();
        self.from_axes(&coords)
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Malformed parameter spaces or sets.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpaceError {
    #[error("parameter space has no parameters")]
    Empty,
    #[error("parameter name must not be empty")]
    EmptyName,
    #[error("duplicate parameter name '{0}'")]
    DuplicateName(String),
    #[error("parameter '{name}': invalid bounds min={min} max={max}")]
    InvalidBounds { name: String, min: f64, max: f64 },
    #[error("parameter '{name}': discrete step must be > 0 (got {step:?})")]
    InvalidStep { name: String, step: Option<f64> },
    #[error("parameter '{name}': discrete lattice has {points:e} points, too many to index")]
    LatticeTooLarge { name: String, points: f64 },
    #[error("parameter '{name}': categorical parameter needs at least one choice")]
    EmptyChoices { name: String },
    #[error("parameter '{name}': duplicate choice '{choice}'")]
    DuplicateChoice { name: String, choice: String },
    #[error("no value for parameter '{0}'")]
    MissingValue(String),
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
    #[error("parameter '{name}': value {value} outside its declared domain")]
    OutOfBounds { name: String, value: String },
}

impl SpaceError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidParameterSpace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn space() -> ParameterSpace {
        ParameterSpace::new(vec![
            ParameterSpec::discrete("fast", 5.0, 15.0, 5.0),
            ParameterSpec::continuous("threshold", 0.0, 1.0),
            ParameterSpec::categorical("mode", ["sma", "ema"]),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = ParameterSpace::new(vec![ParameterSpec::continuous("x", 2.0, 1.0)]).unwrap_err();
        assert!(matches!(err, SpaceError::InvalidBounds { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidParameterSpace);
    }

    #[test]
    fn rejects_zero_step() {
        let err =
            ParameterSpace::new(vec![ParameterSpec::discrete("x", 0.0, 1.0, 0.0)]).unwrap_err();
        assert!(matches!(err, SpaceError::InvalidStep { .. }));
    }

    #[test]
    fn rejects_unindexable_lattice() {
        for step in [1e-300, 1e-6] {
            let err = ParameterSpace::new(vec![ParameterSpec::discrete("x", 0.0, 1e6, step)]).unwrap_err();
            assert!(matches!(err, SpaceError::LatticeTooLarge { .. }), "step {step}");
        }
        // Unvalidated specs still report a saturated size instead of overflowing.
        let spec = ParameterSpec::discrete("x", 0.0, 1.0, 1e-300);
        assert_eq!(spec.grid_len(10), usize::MAX);
        assert!(ParameterSpace::new(vec![ParameterSpec::discrete("x", 0.0, 1e6, 1e-3)]).is_ok());
    }

    #[test]
    fn rejects_missing_step() {
        let mut spec = ParameterSpec::discrete("x", 0.0, 1.0, 1.0);
        spec.step = None;
        assert!(ParameterSpace::new(vec![spec]).is_err());
    }

    #[test]
    fn rejects_duplicates() {
        let err = ParameterSpace::new(vec![
            ParameterSpec::continuous("x", 0.0, 1.0),
            ParameterSpec::continuous("x", 0.0, 2.0),
        ])
        .unwrap_err();
        assert_eq!(err, SpaceError::DuplicateName("x".into()));

        let err = ParameterSpace::new(vec![ParameterSpec::categorical("m", ["a", "a"])]).unwrap_err();
        assert!(matches!(err, SpaceError::DuplicateChoice { .. }));
    }

    #[test]
    fn rejects_empty_space_and_choices() {
        assert_eq!(ParameterSpace::new(vec![]).unwrap_err(), SpaceError::Empty);
        let empty: [&str; 0] = [];
        assert!(ParameterSpace::new(vec![ParameterSpec::categorical("m", empty)]).is_err());
    }

    #[test]
    fn discrete_lattice_includes_max() {
        let spec = ParameterSpec::discrete("x", 0.0, 1.0, 0.1);
        let lattice = spec.lattice();
        assert_eq!(lattice.len(), 11);
        assert!((lattice[10] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn snap_clamps_and_rounds() {
        let spec = ParameterSpec::discrete("x", 5.0, 15.0, 5.0);
        assert_eq!(spec.snap(7.4), 5.0);
        assert_eq!(spec.snap(8.0), 10.0);
        assert_eq!(spec.snap(100.0), 15.0);
        assert_eq!(spec.snap(-3.0), 5.0);
        assert_eq!(spec.snap(f64::NAN), 5.0);
    }

    #[test]
    fn continuous_grid_spans_bounds() {
        let spec = ParameterSpec::continuous("x", 0.0, 1.0);
        let values: Vec<f64> = spec
            .grid_values(5)
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect();
        assert_eq!(values, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(spec.grid_values(1), vec![ParamValue::Number(0.5)]);
    }

    #[test]
    fn grid_is_cartesian_and_ordered() {
        let s = space();
        assert_eq!(s.grid_size(3), Some(3 * 3 * 2));
        let grid = s.grid(3);
        assert_eq!(grid.len(), 18);
        // Last spec varies fastest.
        assert_eq!(grid[0].choice("mode"), Some("sma"));
        assert_eq!(grid[1].choice("mode"), Some("ema"));
        assert_eq!(grid[0].number("fast"), Some(5.0));
        assert_eq!(grid[17].number("fast"), Some(15.0));
        for set in &grid {
            assert!(s.check(set).is_ok());
        }
    }

    #[test]
    fn samples_are_legal() {
        let s = space();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let set = s.sample(&mut rng);
            assert!(s.check(&set).is_ok(), "illegal sample {set}");
        }
    }

    #[test]
    fn unit_roundtrip_snaps_to_legal_values() {
        let s = space();
        let set = s.from_unit(&[0.49, 0.3, 0.9]);
        assert_eq!(set.number("fast"), Some(10.0));
        assert!((set.number("threshold").unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(set.choice("mode"), Some("ema"));
        let unit = s.to_unit(&set);
        assert!((unit[0] - 0.5).abs() < 1e-12);
        assert_eq!(unit[2], 1.0);
    }

    #[test]
    fn check_reports_missing_unknown_and_out_of_bounds() {
        let s = space();
        let mut values = BTreeMap::new();
        values.insert("fast".to_string(), ParamValue::Number(5.0));
        values.insert("threshold".to_string(), ParamValue::Number(0.5));
        assert_eq!(
            s.make_set(values.clone()).unwrap_err(),
            SpaceError::MissingValue("mode".into())
        );

        values.insert("mode".to_string(), ParamValue::Choice("wma".into()));
        assert!(matches!(
            s.make_set(values.clone()).unwrap_err(),
            SpaceError::OutOfBounds { .. }
        ));

        values.insert("mode".to_string(), ParamValue::Choice("ema".into()));
        values.insert("extra".to_string(), ParamValue::Number(1.0));
        assert_eq!(
            s.make_set(values).unwrap_err(),
            SpaceError::UnknownParameter("extra".into())
        );
    }

    #[test]
    fn discrete_off_lattice_is_rejected() {
        let spec = ParameterSpec::discrete("x", 5.0, 15.0, 5.0);
        assert!(spec.contains(&ParamValue::Number(10.0)));
        assert!(!spec.contains(&ParamValue::Number(7.0)));
        assert!(!spec.contains(&ParamValue::Choice("10".into())));
    }

    #[test]
    fn fingerprint_is_stable_and_value_sensitive() {
        let s = space();
        let grid = s.grid(2);
        assert_eq!(grid[0].fingerprint(), grid[0].clone().fingerprint());
        assert_ne!(grid[0].fingerprint(), grid[1].fingerprint());
    }

    #[test]
    fn with_value_leaves_original_untouched() {
        let s = space();
        let set = s.grid(2)[0].clone();
        let changed = set.with_value("fast", ParamValue::Number(15.0));
        assert_eq!(set.number("fast"), Some(5.0));
        assert_eq!(changed.number("fast"), Some(15.0));
    }

    #[test]
    fn space_deserialization_validates() {
        let json = r#"[{"name":"x","kind":"continuous","min":3.0,"max":1.0}]"#;
        assert!(serde_json::from_str::<ParameterSpace>(json).is_err());

        let json = r#"[{"name":"x","kind":"discrete","min":1.0,"max":5.0,"step":1.0},
                       {"name":"m","kind":"categorical","choices":["a","b"]}]"#;
        let space: ParameterSpace = serde_json::from_str(json).unwrap();
        assert_eq!(space.len(), 2);
        assert_eq!(space.grid_size(10), Some(10));
    }

    #[test]
    fn parameter_set_json_is_flat() {
        let s = space();
        let set = s.grid(2)[0].clone();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"{"fast":5.0,"mode":"sma","threshold":0.0}"#);
        let back: ParameterSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
