// src/normalize/aliases.rs

use once_cell::sync::Lazy;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::schema::arrow::is_canonical_column;
use crate::schema::types::{HourField, OVERTIME_PCT, PROCESSING_DATE, PROVIDER_ID, PROVIDER_NAME, STATE};

/// Canonical field a source header can be mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    ProviderId,
    ProviderName,
    State,
    ProcessingDate,
    Hours(HourField),
    OvertimePct,
}

/// Known source spellings (lower-cased, trimmed) → canonical field.
/// Canonical names map to themselves so re-normalizing output is a no-op.
static ALIASES: Lazy<HashMap<&'static str, Target>> = Lazy::new(|| {
    use HourField::*;
    use Target::*;

    let mut m = HashMap::new();
    for k in [
        PROVIDER_ID,
        "provider id",
        "provider number",
        "federal provider number",
        "cms certification number (ccn)",
        "ccn",
        "provider ccn",
        "ccn number",
        "provnum",
    ] {
        m.insert(k, ProviderId);
    }
    for k in [PROVIDER_NAME, "provider name", "facility name", "provname"] {
        m.insert(k, ProviderName);
    }
    for k in [STATE, "provider state"] {
        m.insert(k, State);
    }
    for k in [PROCESSING_DATE, "processing date"] {
        m.insert(k, ProcessingDate);
    }
    for k in [OVERTIME_PCT, "overtime percentage", "percent overtime", "overtime pct"] {
        m.insert(k, OvertimePct);
    }

    let hours: [(HourField, &[&'static str]); 6] = [
        (Rn, &["reported rn staffing hours per resident per day", "rn_hprd"]),
        (Lpn, &["reported lpn staffing hours per resident per day", "lpn_hprd"]),
        (
            Aide,
            &[
                "reported nurse aide staffing hours per resident per day",
                "aide_hprd",
                "cna_hprd",
            ],
        ),
        (RnAdj, &["case-mix rn staffing hours per resident per day", "rn_hprd_adj"]),
        (LpnAdj, &["case-mix lpn staffing hours per resident per day", "lpn_hprd_adj"]),
        (
            AideAdj,
            &[
                "case-mix nurse aide staffing hours per resident per day",
                "aide_hprd_adj",
                "cna_hprd_adj",
            ],
        ),
    ];
    for (field, spellings) in hours {
        for k in spellings {
            m.insert(*k, Hours(field));
        }
    }
    m
});

/// Lower-case and trim a header the way the alias table expects.
pub fn header_key(raw: &str) -> String {
    raw.trim().trim_start_matches('\u{feff}').trim().to_lowercase()
}

/// Exact, case-insensitive lookup.
pub fn lookup(raw_header: &str) -> Option<Target> {
    ALIASES.get(header_key(raw_header).as_str()).copied()
}

/// How each source column index is used.
#[derive(Debug, Default)]
pub struct ColumnMap {
    pub targets: HashMap<Target, usize>,
    /// Unrecognised headers kept as text: (output name, source index).
    pub passthrough: Vec<(String, usize)>,
}

impl ColumnMap {
    pub fn index_of(&self, target: Target) -> Option<usize> {
        self.targets.get(&target).copied()
    }
}

/// Resolve a header row against the alias table. The first header claiming a
/// canonical field wins; later claimants and pass-through names that collide
/// with canonical or earlier columns are dropped.
pub fn resolve_headers(headers: &[String]) -> ColumnMap {
    let mut map = ColumnMap::default();
    for (idx, raw) in headers.iter().enumerate() {
        match lookup(raw) {
            Some(target) => {
                if map.targets.contains_key(&target) {
                    warn!(header = %raw.trim(), ?target, "duplicate alias; keeping first column");
                } else {
                    map.targets.insert(target, idx);
                }
            }
            None => {
                let name = header_key(raw);
                if name.is_empty() {
                    debug!(idx, "dropping blank header");
                } else if is_canonical_column(&name) {
                    debug!(header = %name, "source column shadows a derived column; dropped");
                } else if map.passthrough.iter().any(|(n, _)| n == &name) {
                    debug!(header = %name, "duplicate pass-through header; dropped");
                } else {
                    map.passthrough.push((name, idx));
                }
            }
        }
    }
    map
}
