// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use super::expression::{CmpOp, Condition, GSExpression, Literal, Value};
use super::{millis, CustomModel, Factor, Layer, ModelError, TurnCostTable, Weighting};
use crate::encoding::{
    BooleanEncodedValue, DecimalEncodedValue, EncodedValue, EncodingManager, EnumEncodedValue,
    IntEncodedValue,
};
use crate::storage::CRC64;
use crate::{EdgeId, EdgeState, NodeId};

/// Vehicle limits of a [CustomModel] and the edge attributes they are checked against.
const LIMITS: [(&str, &str); 3] = [
    ("vehicle_width", "max_width"),
    ("vehicle_height", "max_height"),
    ("vehicle_weight", "max_weight"),
];

#[derive(Debug, Clone)]
enum Numeric {
    Int(IntEncodedValue),
    Decimal(DecimalEncodedValue),
}

impl Numeric {
    #[inline]
    fn get(&self, edge: &EdgeState<'_>, reverse: bool) -> f64 {
        match self {
            Self::Int(ev) => edge.get_int(ev, reverse) as f64,
            Self::Decimal(ev) => edge.get_decimal(ev, reverse),
        }
    }
}

/// A [Condition] resolved against an [EncodingManager].
#[derive(Debug, Clone)]
enum Compiled {
    Const(bool),
    Bool(BooleanEncodedValue),
    Category {
        ev: EnumEncodedValue,
        index: usize,
        equal: bool,
    },
    Compare {
        ev: Numeric,
        op: CmpOp,
        value: f64,
    },
    Not(Box<Compiled>),
    And(Box<Compiled>, Box<Compiled>),
    Or(Box<Compiled>, Box<Compiled>),
}

impl Compiled {
    fn eval(&self, edge: &EdgeState<'_>, reverse: bool) -> bool {
        match self {
            Self::Const(b) => *b,
            Self::Bool(ev) => edge.get_bool(ev, reverse),
            Self::Category { ev, index, equal } => {
                (edge.get_enum_index(ev, reverse) == *index) == *equal
            }
            Self::Compare { ev, op, value } => op.apply(ev.get(edge, reverse), *value),
            Self::Not(c) => !c.eval(edge, reverse),
            Self::And(a, b) => a.eval(edge, reverse) && b.eval(edge, reverse),
            Self::Or(a, b) => a.eval(edge, reverse) || b.eval(edge, reverse),
        }
    }

    fn compile(c: &Condition, em: &EncodingManager) -> Result<Self, ModelError> {
        Ok(match c {
            Condition::Const(b) => Self::Const(*b),
            Condition::Var(name) => Self::Bool(em.boolean(name)?.clone()),
            Condition::Not(inner) => Self::Not(Box::new(Self::compile(inner, em)?)),
            Condition::And(a, b) => Self::And(
                Box::new(Self::compile(a, em)?),
                Box::new(Self::compile(b, em)?),
            ),
            Condition::Or(a, b) => Self::Or(
                Box::new(Self::compile(a, em)?),
                Box::new(Self::compile(b, em)?),
            ),
            Condition::Compare { name, op, value } => compile_comparison(em, name, *op, value)?,
        })
    }
}

fn invalid(name: &str, message: impl Into<String>) -> ModelError {
    ModelError::InvalidCondition {
        name: name.to_string(),
        message: message.into(),
    }
}

fn compile_comparison(
    em: &EncodingManager,
    name: &str,
    op: CmpOp,
    value: &Literal,
) -> Result<Compiled, ModelError> {
    let equal = match op {
        CmpOp::Eq => Some(true),
        CmpOp::Ne => Some(false),
        _ => None,
    };

    match (em.get(name)?, value) {
        (EncodedValue::Enum(ev), Literal::Str(category) | Literal::Constant(category)) => {
            let equal = equal.ok_or_else(|| invalid(name, "categories only support == and !="))?;
            let index = match value {
                Literal::Constant(_) => ev
                    .categories()
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(category)),
                _ => ev.index_of(category),
            };
            let index = index.ok_or_else(|| {
                ModelError::Encoding(crate::encoding::EncodingError::UnknownCategory {
                    name: name.to_string(),
                    category: category.clone(),
                })
            })?;
            Ok(Compiled::Category {
                ev: ev.clone(),
                index,
                equal,
            })
        }

        (EncodedValue::Boolean(ev), Literal::Bool(b)) => {
            let equal = equal.ok_or_else(|| invalid(name, "booleans only support == and !="))?;
            let var = Compiled::Bool(ev.clone());
            Ok(if *b == equal {
                var
            } else {
                Compiled::Not(Box::new(var))
            })
        }

        (EncodedValue::Int(ev), Literal::Number(n)) => Ok(Compiled::Compare {
            ev: Numeric::Int(ev.clone()),
            op,
            value: *n,
        }),

        (EncodedValue::Decimal(ev), Literal::Number(n)) => Ok(Compiled::Compare {
            ev: Numeric::Decimal(ev.clone()),
            op,
            value: *n,
        }),

        (ev, lit) => Err(invalid(
            name,
            format!("cannot compare a {} value with {}", ev.kind(), lit),
        )),
    }
}

/// A list of `(condition, factor)` pairs; the first matching pair gives the block's factor.
#[derive(Debug, Clone, Default)]
struct Block(Vec<(Compiled, f64)>);

impl Block {
    #[inline]
    fn factor(&self, edge: &EdgeState<'_>, reverse: bool) -> f64 {
        self.0
            .iter()
            .find(|(c, _)| c.eval(edge, reverse))
            .map(|&(_, f)| f)
            .unwrap_or(1.0)
    }

    fn from_rules(em: &EncodingManager, target: &str, rules: &[GSExpression]) -> Result<Self, ModelError> {
        let mut block = Vec::with_capacity(rules.len());
        for rule in rules {
            let cond = match &rule.condition {
                Some(c) => Compiled::compile(c, em)?,
                None => Compiled::Const(true),
            };
            let factor = match rule.value {
                Value::Number(n) => check_factor(target, n)?,
                Value::Str(_) => {
                    return Err(ModelError::TypeCheck {
                        target: target.to_string(),
                        expected: "numeric",
                    })
                }
            };
            block.push((cond, factor));
        }
        Ok(Self(block))
    }
}

fn check_factor(name: &str, value: f64) -> Result<f64, ModelError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ModelError::InvalidFactor {
            name: name.to_string(),
            value,
        })
    }
}

fn factor_value(path: &str, f: &Factor) -> Result<f64, ModelError> {
    let n = match f {
        Factor::Number(n) => *n,
        Factor::Text(s) => s.trim().parse().map_err(|_| ModelError::TypeCheck {
            target: path.to_string(),
            expected: "numeric",
        })?,
        Factor::Map(_) => {
            return Err(ModelError::TypeCheck {
                target: path.to_string(),
                expected: "numeric",
            })
        }
    };
    check_factor(path, n)
}

/// Parses a numeric layer key such as `<2.5`, `>=3` or `7` (meaning `==7`).
fn numeric_key(path: &str, key: &str) -> Result<(CmpOp, f64), ModelError> {
    let key = key.trim();
    let (op, rest) = [
        ("<=", CmpOp::Le),
        (">=", CmpOp::Ge),
        ("==", CmpOp::Eq),
        ("!=", CmpOp::Ne),
        ("<", CmpOp::Lt),
        (">", CmpOp::Gt),
    ]
    .iter()
    .find_map(|&(prefix, op)| key.strip_prefix(prefix).map(|r| (op, r)))
    .unwrap_or((CmpOp::Eq, key));

    let value = rest
        .trim()
        .parse()
        .map_err(|_| invalid(path, format!("invalid numeric range {:?}", key)))?;
    Ok((op, value))
}

/// Compiles a categorical layer into blocks, one per encoded value.
fn layer_blocks(em: &EncodingManager, layer_name: &str, layer: &Layer) -> Result<Vec<Block>, ModelError> {
    let mut blocks = Vec::with_capacity(layer.len());
    for (name, entry) in layer {
        let path = format!("{}.{}", layer_name, name);
        let categories = match entry {
            Factor::Map(m) => m,
            // A bare number applies to all edges
            other => {
                let factor = factor_value(&path, other)?;
                blocks.push(Block(vec![(Compiled::Const(true), factor)]));
                continue;
            }
        };

        let ev = em.get(name)?;
        let mut block = Vec::with_capacity(categories.len());
        for (key, f) in categories {
            let entry_path = format!("{}.{}", path, key);
            let factor = factor_value(&entry_path, f)?;
            let cond = match ev {
                EncodedValue::Enum(ev) => compile_comparison(em, name, CmpOp::Eq, &Literal::Str(key.clone()))
                    .map_err(|_| ModelError::Encoding(crate::encoding::EncodingError::UnknownCategory {
                        name: ev.name().to_string(),
                        category: key.clone(),
                    }))?,
                EncodedValue::Boolean(_) => match key.as_str() {
                    "true" => compile_comparison(em, name, CmpOp::Eq, &Literal::Bool(true))?,
                    "false" => compile_comparison(em, name, CmpOp::Eq, &Literal::Bool(false))?,
                    _ => return Err(invalid(&entry_path, "expected \"true\" or \"false\"")),
                },
                EncodedValue::Int(_) | EncodedValue::Decimal(_) => {
                    let (op, value) = numeric_key(&entry_path, key)?;
                    compile_comparison(em, name, op, &Literal::Number(value))?
                }
            };
            block.push((cond, factor));
        }
        blocks.push(Block(block));
    }
    Ok(blocks)
}

/// [Weighting] compiled from a [CustomModel].
///
/// `weight = distance / (speed / 3.6) / priority + distance * distance_influence / 1000`,
/// where `speed` is `{base}_average_speed` adjusted by the speed layer and rules and
/// capped at `max_speed`, and `priority` is `{base}_priority` (1 if not encoded)
/// adjusted by the priority layer and rules.
#[derive(Debug, Clone)]
pub struct CustomWeighting {
    name: String,
    access: BooleanEncodedValue,
    speed: DecimalEncodedValue,
    priority: Option<DecimalEncodedValue>,
    max_speed: f64,
    distance_influence: f64,
    limits: Vec<(DecimalEncodedValue, f64)>,
    speed_blocks: Vec<Block>,
    priority_blocks: Vec<Block>,
    turn_costs: Option<Arc<TurnCostTable>>,
    model_hash: u64,
}

impl CustomWeighting {
    pub fn new(name: &str, model: &CustomModel, em: &EncodingManager) -> Result<Self, ModelError> {
        let base = model.base.as_deref().ok_or(ModelError::MissingBase)?;

        let priority_name = format!("{}_priority", base);
        let priority = if em.has(&priority_name) {
            Some(em.decimal(&priority_name)?.clone())
        } else {
            None
        };

        let max_speed = match model.max_speed {
            Some(s) if s.is_finite() && s > 0.0 => s,
            Some(s) => {
                return Err(ModelError::InvalidFactor {
                    name: "max_speed".to_string(),
                    value: s,
                })
            }
            None => f64::INFINITY,
        };

        let distance_influence = check_factor("distance_influence", model.distance_influence.unwrap_or(0.0))?;

        let mut limits = Vec::new();
        for (field, ev_name) in LIMITS {
            let value = match field {
                "vehicle_width" => model.vehicle_width,
                "vehicle_height" => model.vehicle_height,
                _ => model.vehicle_weight,
            };
            if let Some(v) = value {
                limits.push((em.decimal(ev_name)?.clone(), check_factor(field, v)?));
            }
        }

        let mut speed_blocks = layer_blocks(em, "speed", &model.speed)?;
        for rules in &model.speed_rules {
            speed_blocks.push(Block::from_rules(em, "speed", rules)?);
        }

        let mut priority_blocks = layer_blocks(em, "priority", &model.priority)?;
        for rules in &model.priority_rules {
            priority_blocks.push(Block::from_rules(em, "priority", rules)?);
        }

        log::debug!(
            "compiled weighting {}: {} speed blocks, {} priority blocks, {} limits",
            name,
            speed_blocks.len(),
            priority_blocks.len(),
            limits.len(),
        );

        Ok(Self {
            name: name.to_string(),
            access: em.boolean(&format!("{}_access", base))?.clone(),
            speed: em.decimal(&format!("{}_average_speed", base))?.clone(),
            priority,
            max_speed,
            distance_influence,
            limits,
            speed_blocks,
            priority_blocks,
            turn_costs: None,
            model_hash: CRC64.checksum(&serde_json::to_vec(model)?),
        })
    }

    /// Enables turn costs from the provided table.
    pub fn with_turn_costs(mut self, table: Arc<TurnCostTable>) -> Self {
        self.turn_costs = Some(table);
        self
    }

    /// Effective speed in km/h.
    pub fn speed(&self, edge: &EdgeState<'_>, reverse: bool) -> f64 {
        let mut speed = edge.get_decimal(&self.speed, reverse);
        for b in &self.speed_blocks {
            speed *= b.factor(edge, reverse);
        }
        speed.min(self.max_speed)
    }

    pub fn priority(&self, edge: &EdgeState<'_>, reverse: bool) -> f64 {
        let mut priority = match &self.priority {
            Some(ev) => edge.get_decimal(ev, reverse),
            None => 1.0,
        };
        for b in &self.priority_blocks {
            priority *= b.factor(edge, reverse);
        }
        priority
    }

    fn accessible(&self, edge: &EdgeState<'_>, reverse: bool) -> bool {
        edge.get_bool(&self.access, reverse)
            && self
                .limits
                .iter()
                .all(|(ev, limit)| edge.get_decimal(ev, reverse) >= *limit)
    }
}

impl Weighting for CustomWeighting {
    fn name(&self) -> &str {
        &self.name
    }

    fn calc_edge_weight(&self, edge: &EdgeState<'_>, reverse: bool) -> f64 {
        if !self.accessible(edge, reverse) {
            return f64::INFINITY;
        }

        let speed = self.speed(edge, reverse);
        let priority = self.priority(edge, reverse);
        if speed <= 0.0 || priority <= 0.0 {
            return f64::INFINITY;
        }

        let distance = edge.distance();
        distance / (speed / 3.6) / priority + distance * self.distance_influence / 1000.0
    }

    fn calc_edge_millis(&self, edge: &EdgeState<'_>, reverse: bool) -> u64 {
        millis(edge.distance(), self.speed(edge, reverse))
    }

    fn calc_turn_weight(&self, in_edge: EdgeId, via: NodeId, out_edge: EdgeId) -> f64 {
        match &self.turn_costs {
            Some(t) => t.get(in_edge, via, out_edge),
            None => 0.0,
        }
    }

    fn has_turn_costs(&self) -> bool {
        self.turn_costs.is_some()
    }

    fn fingerprint(&self) -> u64 {
        let mut digest = CRC64.digest();
        digest.update(self.name.as_bytes());
        digest.update(&[0]);
        digest.update(&self.model_hash.to_le_bytes());
        digest.update(&[self.turn_costs.is_some() as u8]);
        digest.finalize()
    }
}
