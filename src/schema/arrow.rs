// src/schema/arrow.rs

use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, ArrayRef, Date32Array, Float64Array, StringArray},
    datatypes::{DataType, Date32Type, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use std::sync::Arc;

use super::types::*;

/// Canonical columns in output order, with their Arrow types and nullability.
pub fn canonical_fields() -> Vec<Field> {
    let mut fields = vec![
        Field::new(PROVIDER_ID, DataType::Utf8, false),
        Field::new(PROVIDER_NAME, DataType::Utf8, false),
        Field::new(STATE, DataType::Utf8, false),
        Field::new(PERIOD, DataType::Utf8, false),
        Field::new(PROCESSING_DATE, DataType::Date32, true),
    ];
    for hf in HourField::ALL {
        fields.push(Field::new(hf.column(), DataType::Float64, true));
    }
    for name in [OVERTIME_PCT, TOTAL_HOURS_REPORTED, TOTAL_HOURS_ADJUSTED, TOTAL_HOURS] {
        fields.push(Field::new(name, DataType::Float64, true));
    }
    fields
}

pub fn is_canonical_column(name: &str) -> bool {
    canonical_fields().iter().any(|f| f.name() == name)
}

/// Canonical schema followed by one nullable Utf8 field per pass-through column.
pub fn build_canonical_schema(passthrough: &[PassthroughColumn]) -> SchemaRef {
    let mut fields = canonical_fields();
    fields.extend(
        passthrough
            .iter()
            .map(|c| Field::new(&c.name, DataType::Utf8, true)),
    );
    Arc::new(Schema::new(fields))
}

/// Check that `schema` carries every canonical column with the expected type.
/// Extra columns are allowed.
pub fn check_canonical_schema(schema: &Schema) -> Result<(), String> {
    for expected in canonical_fields() {
        let found = schema
            .field_with_name(expected.name())
            .map_err(|_| format!("missing column `{}`", expected.name()))?;
        if found.data_type() != expected.data_type() {
            return Err(format!(
                "column `{}` has type {:?}, expected {:?}",
                expected.name(),
                found.data_type(),
                expected.data_type()
            ));
        }
    }
    Ok(())
}

fn float_column<F>(records: &[CanonicalRecord], f: F) -> ArrayRef
where
    F: Fn(&CanonicalRecord) -> Option<f64>,
{
    Arc::new(records.iter().map(f).collect::<Float64Array>())
}

fn string_column<F>(records: &[CanonicalRecord], f: F) -> ArrayRef
where
    F: Fn(&CanonicalRecord) -> &str,
{
    Arc::new(StringArray::from_iter_values(records.iter().map(f)))
}

/// Convert a canonical table into a single `RecordBatch`.
pub fn to_record_batch(table: &CanonicalTable) -> Result<RecordBatch> {
    let recs = &table.records;
    let mut cols: Vec<ArrayRef> = vec![
        string_column(recs, |r| r.provider_id.as_str()),
        string_column(recs, |r| r.provider_name.as_str()),
        string_column(recs, |r| r.state.as_str()),
        string_column(recs, |r| r.period.as_str()),
        Arc::new(
            recs.iter()
                .map(|r| r.processing_date.map(Date32Type::from_naive_date))
                .collect::<Date32Array>(),
        ),
    ];
    for hf in HourField::ALL {
        cols.push(float_column(recs, |r| r.hours.get(hf)));
    }
    cols.push(float_column(recs, |r| r.overtime_pct));
    cols.push(float_column(recs, |r| r.total_hours_reported));
    cols.push(float_column(recs, |r| r.total_hours_adjusted));
    cols.push(float_column(recs, |r| r.total_hours));

    for pc in &table.passthrough {
        if pc.values.len() != recs.len() {
            return Err(anyhow!(
                "pass-through column `{}` has {} values for {} rows",
                pc.name,
                pc.values.len(),
                recs.len()
            ));
        }
        cols.push(Arc::new(pc.values.iter().map(|v| v.as_deref()).collect::<StringArray>()));
    }

    RecordBatch::try_new(build_canonical_schema(&table.passthrough), cols)
        .context("building canonical record batch")
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| anyhow!("missing column `{}`", name))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| anyhow!("column `{}` has an unexpected type", name))
}

fn opt_f64(arr: &Float64Array, i: usize) -> Option<f64> {
    if arr.is_null(i) {
        None
    } else {
        Some(arr.value(i))
    }
}

fn required_str<'a>(arr: &'a StringArray, name: &str, i: usize) -> Result<&'a str> {
    if arr.is_null(i) {
        return Err(anyhow!("null `{}` at row {}", name, i));
    }
    Ok(arr.value(i))
}

/// Read canonical rows back out of a batch. Pass-through columns are ignored.
pub fn records_from_batch(batch: &RecordBatch) -> Result<Vec<CanonicalRecord>> {
    let ids = column::<StringArray>(batch, PROVIDER_ID)?;
    let names = column::<StringArray>(batch, PROVIDER_NAME)?;
    let states = column::<StringArray>(batch, STATE)?;
    let periods = column::<StringArray>(batch, PERIOD)?;
    let dates = column::<Date32Array>(batch, PROCESSING_DATE)?;
    let hour_cols = HourField::ALL
        .iter()
        .map(|hf| column::<Float64Array>(batch, hf.column()).map(|a| (*hf, a)))
        .collect::<Result<Vec<_>>>()?;
    let overtime = column::<Float64Array>(batch, OVERTIME_PCT)?;
    let reported = column::<Float64Array>(batch, TOTAL_HOURS_REPORTED)?;
    let adjusted = column::<Float64Array>(batch, TOTAL_HOURS_ADJUSTED)?;
    let total = column::<Float64Array>(batch, TOTAL_HOURS)?;

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let mut hours = HourComponents::default();
        for (hf, arr) in &hour_cols {
            hours.set(*hf, opt_f64(arr, i));
        }
        out.push(CanonicalRecord {
            provider_id: required_str(ids, PROVIDER_ID, i)?.to_string(),
            provider_name: required_str(names, PROVIDER_NAME, i)?.to_string(),
            state: required_str(states, STATE, i)?.to_string(),
            period: required_str(periods, PERIOD, i)?.to_string(),
            processing_date: if dates.is_null(i) {
                None
            } else {
                Some(Date32Type::to_naive_date(dates.value(i)))
            },
            hours,
            overtime_pct: opt_f64(overtime, i),
            total_hours_reported: opt_f64(reported, i),
            total_hours_adjusted: opt_f64(adjusted, i),
            total_hours: opt_f64(total, i),
        });
    }
    Ok(out)
}
