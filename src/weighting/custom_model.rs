// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::expression::{self, GSAssignment, GSExpression, Value};
use super::ModelError;

/// A factor inside a speed or priority layer.
///
/// Layers map an encoded value name to its categories, and each category to a
/// multiplicative factor: `{"surface": {"mud": 0.1}, "max_width": {"<2.5": 0}}`.
/// A bare number at the top of a layer applies to every edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Factor {
    Number(f64),
    Text(String),
    Map(BTreeMap<String, Factor>),
}

impl Factor {
    fn kind(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Text(_) => "string",
            Self::Map(_) => "map",
        }
    }
}

pub type Layer = BTreeMap<String, Factor>;

/// Declarative description of a vehicle's costs, layered on top of a base vehicle.
///
/// Speed and priority are adjusted twice: first by the categorical layers,
/// then by rule blocks written in the [expression language](super::expression).
/// Every block contributes the value of its first matching expression (1 if none matches),
/// and all contributions multiply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CustomModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    /// Speed ceiling in km/h.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_speed: Option<f64>,

    /// Vehicle width in meters. Edges with a smaller `max_width` become inaccessible.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_width: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_height: Option<f64>,

    /// Vehicle weight in tonnes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_weight: Option<f64>,

    /// Extra cost per kilometer, in seconds. Trades time for distance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_influence: Option<f64>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub speed: Layer,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub priority: Layer,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub speed_rules: Vec<Vec<GSExpression>>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub priority_rules: Vec<Vec<GSExpression>>,
}

impl CustomModel {
    pub fn for_base(base: &str) -> Self {
        Self {
            base: Some(base.to_string()),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses and type-checks an expression document, then converts it with
    /// [CustomModel::from_assignments].
    pub fn parse(text: &str) -> Result<Self, ModelError> {
        Self::from_assignments(&expression::parse_checked(text)?)
    }

    /// Builds a model from parsed assignments. Scalar targets (`base`, `max_speed`,
    /// `distance_influence`, `vehicle_*`) take a single unconditional value;
    /// each `speed` / `priority` target becomes one rule block.
    pub fn from_assignments(assignments: &[GSAssignment]) -> Result<Self, ModelError> {
        expression::type_check(assignments)?;

        let mut model = Self::default();
        for a in assignments {
            match a.target.as_str() {
                "speed" => model.speed_rules.push(a.expressions.clone()),
                "priority" => model.priority_rules.push(a.expressions.clone()),
                target => {
                    let value = scalar(a)?;
                    match (target, value) {
                        ("base", Value::Str(s)) => model.base = Some(s.clone()),
                        ("max_speed", Value::Number(n)) => model.max_speed = Some(*n),
                        ("distance_influence", Value::Number(n)) => {
                            model.distance_influence = Some(*n)
                        }
                        ("vehicle_width", Value::Number(n)) => model.vehicle_width = Some(*n),
                        ("vehicle_height", Value::Number(n)) => model.vehicle_height = Some(*n),
                        ("vehicle_weight", Value::Number(n)) => model.vehicle_weight = Some(*n),
                        _ => return Err(ModelError::UnknownTarget(target.to_string())),
                    }
                }
            }
        }
        Ok(model)
    }

    /// Applies `overlay` on top of `base`.
    ///
    /// - limits and `max_speed` may only tighten (a lower value is tighter);
    /// - `distance_influence` of the overlay wins;
    /// - `base` vehicles must agree when both are set;
    /// - layers merge deeply, multiplying numeric factors present on both sides;
    /// - a text factor present on both sides isn't combined, the overlay's text replaces the base's;
    /// - rule blocks of the overlay follow those of the base.
    ///
    /// Merging a model with itself returns it unchanged.
    pub fn merge(base: &CustomModel, overlay: &CustomModel) -> Result<CustomModel, ModelError> {
        if base == overlay {
            return Ok(base.clone());
        }

        let vehicle = match (&base.base, &overlay.base) {
            (Some(b), Some(o)) if b != o => {
                return Err(ModelError::BaseMismatch {
                    base: b.clone(),
                    overlay: o.clone(),
                })
            }
            (b, o) => b.clone().or_else(|| o.clone()),
        };

        let mut speed_rules = base.speed_rules.clone();
        speed_rules.extend(overlay.speed_rules.iter().cloned());
        let mut priority_rules = base.priority_rules.clone();
        priority_rules.extend(overlay.priority_rules.iter().cloned());

        Ok(CustomModel {
            base: vehicle,
            max_speed: tighten("max_speed", base.max_speed, overlay.max_speed)?,
            vehicle_width: tighten("vehicle_width", base.vehicle_width, overlay.vehicle_width)?,
            vehicle_height: tighten("vehicle_height", base.vehicle_height, overlay.vehicle_height)?,
            vehicle_weight: tighten("vehicle_weight", base.vehicle_weight, overlay.vehicle_weight)?,
            distance_influence: overlay.distance_influence.or(base.distance_influence),
            speed: merge_layer("speed", &base.speed, &overlay.speed)?,
            priority: merge_layer("priority", &base.priority, &overlay.priority)?,
            speed_rules,
            priority_rules,
        })
    }
}

fn scalar(a: &GSAssignment) -> Result<&Value, ModelError> {
    match a.expressions.as_slice() {
        [GSExpression {
            condition: None,
            value,
        }] => Ok(value),
        _ => Err(ModelError::InvalidCondition {
            name: a.target.clone(),
            message: "expected a single unconditional value".to_string(),
        }),
    }
}

fn tighten(field: &'static str, base: Option<f64>, overlay: Option<f64>) -> Result<Option<f64>, ModelError> {
    match (base, overlay) {
        (Some(b), Some(o)) if o > b => Err(ModelError::LooserLimit {
            field,
            base: b,
            overlay: o,
        }),
        (_, Some(o)) => Ok(Some(o)),
        (b, None) => Ok(b),
    }
}

fn merge_layer(path: &str, base: &Layer, overlay: &Layer) -> Result<Layer, ModelError> {
    let mut merged = base.clone();
    for (key, o) in overlay {
        let entry_path = format!("{}.{}", path, key);
        let value = match base.get(key) {
            Some(b) => merge_factor(&entry_path, b, o)?,
            None => o.clone(),
        };
        merged.insert(key.clone(), value);
    }
    Ok(merged)
}

fn merge_factor(path: &str, base: &Factor, overlay: &Factor) -> Result<Factor, ModelError> {
    match (base, overlay) {
        (Factor::Number(a), Factor::Number(b)) => Ok(Factor::Number(a * b)),
        (Factor::Map(a), Factor::Map(b)) => Ok(Factor::Map(merge_layer(path, a, b)?)),
        (Factor::Text(_), Factor::Text(_)) => Ok(overlay.clone()),
        _ => Err(ModelError::TypeMismatch {
            path: path.to_string(),
            base: base.kind(),
            overlay: overlay.kind(),
        }),
    }
}
