// src/marts/aggregate.rs

use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{ArrayRef, Float64Array, StringArray, UInt32Array, UInt64Array},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use super::rules::{Aggregate, Dimension, MartRule, Measure, RANK};
use crate::schema::types::CanonicalRecord;

/// One computed cell of a summary row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(Option<String>),
    Float(Option<f64>),
    Count(u64),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => *v,
            Value::Count(c) => Some(*c as f64),
            Value::Text(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Text(None) | Value::Float(None))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub keys: Vec<String>,
    pub values: Vec<Value>,
    /// 1-based position within its partition, for ranked marts.
    pub rank: Option<u32>,
}

/// A fully materialised mart.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    pub rule: MartRule,
    pub rows: Vec<SummaryRow>,
}

/// Running state of one aggregate column; each variant carries its own input.
enum Acc {
    Mean { m: Measure, sum: f64, n: u64 },
    Sum { m: Measure, total: Option<f64> },
    Count { m: Measure, n: u64 },
    Distinct { d: Dimension, seen: BTreeSet<String> },
    First { d: Dimension, slot: Option<String> },
}

impl Acc {
    fn new(agg: Aggregate) -> Self {
        match agg {
            Aggregate::Mean(m) => Acc::Mean { m, sum: 0.0, n: 0 },
            Aggregate::Sum(m) => Acc::Sum { m, total: None },
            Aggregate::Count(m) => Acc::Count { m, n: 0 },
            Aggregate::CountDistinct(d) => Acc::Distinct { d, seen: BTreeSet::new() },
            Aggregate::First(d) => Acc::First { d, slot: None },
        }
    }

    fn update(&mut self, r: &CanonicalRecord) {
        match self {
            Acc::Mean { m, sum, n } => {
                if let Some(v) = m.value(r) {
                    *sum += v;
                    *n += 1;
                }
            }
            Acc::Sum { m, total } => {
                if let Some(v) = m.value(r) {
                    *total = Some(total.unwrap_or(0.0) + v);
                }
            }
            Acc::Count { m, n } => {
                if m.value(r).is_some() {
                    *n += 1;
                }
            }
            Acc::Distinct { d, seen } => {
                seen.insert(d.value(r).to_string());
            }
            Acc::First { d, slot } => {
                if slot.is_none() {
                    *slot = Some(d.value(r).to_string());
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            Acc::Mean { sum, n, .. } => Value::Float((n > 0).then(|| sum / n as f64)),
            Acc::Sum { total, .. } => Value::Float(total),
            Acc::Count { n, .. } => Value::Count(n),
            Acc::Distinct { seen, .. } => Value::Count(seen.len() as u64),
            Acc::First { slot, .. } => Value::Text(slot),
        }
    }
}

fn column_index(rule: &MartRule, name: &str) -> Result<usize> {
    rule.columns
        .iter()
        .position(|c| c.name == name)
        .ok_or_else(|| anyhow!("mart `{}` has no column `{}`", rule.name, name))
}

/// Descending by value, nulls last.
fn desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Evaluate one rule over the canonical rows. Output is ordered by group key,
/// or by partition key then rank for ranked rules.
pub fn evaluate(rule: &MartRule, records: &[CanonicalRecord]) -> Result<SummaryTable> {
    let mut groups: BTreeMap<Vec<String>, Vec<Acc>> = BTreeMap::new();
    for r in records.iter().filter(|r| rule.filter.keep(r)) {
        let key: Vec<String> = rule.group_by.iter().map(|d| d.value(r).to_string()).collect();
        let accs = groups
            .entry(key)
            .or_insert_with(|| rule.columns.iter().map(|c| Acc::new(c.agg)).collect());
        for acc in accs.iter_mut() {
            acc.update(r);
        }
    }

    let mut rows: Vec<SummaryRow> = groups
        .into_iter()
        .map(|(keys, accs)| SummaryRow {
            keys,
            values: accs.into_iter().map(Acc::finish).collect(),
            rank: None,
        })
        .collect();

    if let Some(required) = rule.require {
        let idx = column_index(rule, required)?;
        rows.retain(|row| !row.values[idx].is_null());
    }

    if let Some(ranking) = &rule.ranking {
        let order_idx = column_index(rule, ranking.order_by)?;
        let part_idx = ranking
            .partition_by
            .iter()
            .map(|d| {
                rule.group_by.iter().position(|g| g == d).ok_or_else(|| {
                    anyhow!("mart `{}` partitions by {:?} which it does not group by", rule.name, d)
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut partitions: BTreeMap<Vec<String>, Vec<SummaryRow>> = BTreeMap::new();
        for row in rows {
            let pk = part_idx.iter().map(|i| row.keys[*i].clone()).collect();
            partitions.entry(pk).or_default().push(row);
        }

        rows = Vec::new();
        for (_, mut members) in partitions {
            members.sort_by(|a, b| {
                desc_nulls_last(a.values[order_idx].as_f64(), b.values[order_idx].as_f64())
                    .then_with(|| a.keys.cmp(&b.keys))
            });
            for (i, mut row) in members.into_iter().take(ranking.limit).enumerate() {
                row.rank = Some(i as u32 + 1);
                rows.push(row);
            }
        }
    }

    Ok(SummaryTable {
        rule: rule.clone(),
        rows,
    })
}

impl SummaryTable {
    pub fn name(&self) -> &str {
        self.rule.name
    }

    pub fn schema(&self) -> SchemaRef {
        let mut fields: Vec<Field> = self
            .rule
            .group_by
            .iter()
            .map(|d| Field::new(d.column(), DataType::Utf8, false))
            .collect();
        for c in &self.rule.columns {
            let (ty, nullable) = match c.agg {
                Aggregate::Mean(_) | Aggregate::Sum(_) => (DataType::Float64, true),
                Aggregate::Count(_) | Aggregate::CountDistinct(_) => (DataType::UInt64, false),
                Aggregate::First(_) => (DataType::Utf8, true),
            };
            fields.push(Field::new(c.name, ty, nullable));
        }
        if self.rule.ranking.is_some() {
            fields.push(Field::new(RANK, DataType::UInt32, false));
        }
        Arc::new(Schema::new(fields))
    }

    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut cols: Vec<ArrayRef> = Vec::new();
        for k in 0..self.rule.group_by.len() {
            cols.push(Arc::new(StringArray::from_iter_values(
                self.rows.iter().map(|r| r.keys[k].as_str()),
            )));
        }
        for (i, c) in self.rule.columns.iter().enumerate() {
            let arr: ArrayRef = match c.agg {
                Aggregate::Mean(_) | Aggregate::Sum(_) => Arc::new(
                    self.rows
                        .iter()
                        .map(|r| r.values[i].as_f64())
                        .collect::<Float64Array>(),
                ),
                Aggregate::Count(_) | Aggregate::CountDistinct(_) => {
                    Arc::new(UInt64Array::from_iter_values(self.rows.iter().map(|r| {
                        match r.values[i] {
                            Value::Count(n) => n,
                            _ => 0,
                        }
                    })))
                }
                Aggregate::First(_) => Arc::new(
                    self.rows
                        .iter()
                        .map(|r| match &r.values[i] {
                            Value::Text(t) => t.as_deref(),
                            _ => None,
                        })
                        .collect::<StringArray>(),
                ),
            };
            cols.push(arr);
        }
        if self.rule.ranking.is_some() {
            cols.push(Arc::new(UInt32Array::from_iter_values(
                self.rows.iter().map(|r| r.rank.unwrap_or(0)),
            )));
        }
        RecordBatch::try_new(self.schema(), cols)
            .with_context(|| format!("building batch for mart `{}`", self.rule.name))
    }
}
