// Payload normalizer - Reconciles schema-varying snapshots into the canonical shape
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::domain::payload::{CanonicalPayload, is_truthy, parse_leading_num, parse_num_strict};
use crate::domain::telemetry::TemperatureReading;

/// Highest keyed channel index scanned during array reconstruction.
const MAX_KEYED_CHANNELS: usize = 32;

/// A missing key at or below this index is skipped and the scan keeps
/// going; a gap beyond it ends the scan.
const CONTIGUOUS_SCAN_DEPTH: usize = 8;

/// Which fourth system-status flag the upstream firmware revision carries.
///
/// Firmware revisions disagree here, so the rule is selected in
/// configuration rather than guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FourthFlagRule {
    /// Invert `faults.deltaVoltage` into a `DeltaVoltage` flag; a missing
    /// fault field reads as "no fault".
    #[default]
    DeltaVoltage,
    /// The revision reports no matching fault field; emit `ShortCircuit`
    /// as OK.
    ShortCircuit,
}

/// Where keyed `V1..`/`T1..` channels are searched first when the raw
/// payload carries no array form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelSearchOrder {
    /// Keyed sub-object first, root-level keys second.
    #[default]
    NestedThenRoot,
    /// Root-level keys first, keyed sub-object second.
    RootThenNested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NormalizerOptions {
    pub fourth_flag: FourthFlagRule,
    pub search_order: ChannelSearchOrder,
}

/// Maps an arbitrary raw telemetry document onto the canonical payload
/// shape, synthesizing missing sections from alternate upstream field
/// names. Never fails: unparsable fields are omitted (timestamp falls
/// back to the ingestion clock, SOH to 100), unrecognized fields are
/// preserved unchanged, and non-object input passes through untouched.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    options: NormalizerOptions,
}

impl Normalizer {
    pub fn new(options: NormalizerOptions) -> Self {
        Self { options }
    }

    /// Normalize one raw snapshot. `now_ms` is the ingestion wall-clock
    /// time, injected so normalization stays deterministic under test.
    pub fn normalize(&self, raw: Value, now_ms: i64) -> CanonicalPayload {
        let mut doc = match raw {
            Value::Object(map) => map,
            other => return CanonicalPayload::new(other),
        };

        let timestamp = doc
            .get("timestamp")
            .and_then(parse_timestamp)
            .unwrap_or(now_ms);
        doc.insert("timestamp".to_string(), Value::from(timestamp));

        // An upstream-provided dashboard takes precedence over synthesis.
        if !doc.contains_key("dashboard") {
            let dashboard = synthesize_dashboard(&doc);
            doc.insert("dashboard".to_string(), Value::Object(dashboard));
        }

        if !doc.contains_key("systemStatus") {
            if let Some(status) = self.synthesize_status(&doc) {
                doc.insert("systemStatus".to_string(), Value::Object(status));
            }
        }

        if !doc.get("cellVoltages").is_some_and(Value::is_array) {
            if let Some(cells) = self.reconstruct_cells(&doc) {
                let cells: Vec<Value> = cells.into_iter().map(Value::from).collect();
                doc.insert("cellVoltages".to_string(), Value::Array(cells));
            }
        }

        if !doc.get("temperatures").is_some_and(Value::is_array) {
            if let Some(temps) = self.reconstruct_temperatures(&doc) {
                if let Ok(temps) = serde_json::to_value(temps) {
                    doc.insert("temperatures".to_string(), temps);
                }
            }
        }

        CanonicalPayload::new(Value::Object(doc))
    }

    /// Canonical status flags are the logical inverse of upstream fault
    /// flags: `true` means OK. Synthesized only when the raw payload has
    /// no `systemStatus` of its own but does carry a `faults` object.
    fn synthesize_status(&self, doc: &Map<String, Value>) -> Option<Map<String, Value>> {
        let faults = doc.get("faults")?.as_object()?;
        let fault_active = |key: &str| faults.get(key).map(is_truthy).unwrap_or(false);

        let mut status = Map::new();
        status.insert("Overvoltage".to_string(), Value::Bool(!fault_active("voltage")));
        status.insert("Overcurrent".to_string(), Value::Bool(!fault_active("current")));
        status.insert("Overtemp".to_string(), Value::Bool(!fault_active("temperature")));
        match self.options.fourth_flag {
            FourthFlagRule::DeltaVoltage => {
                status.insert(
                    "DeltaVoltage".to_string(),
                    Value::Bool(!fault_active("deltaVoltage")),
                );
            }
            FourthFlagRule::ShortCircuit => {
                status.insert("ShortCircuit".to_string(), Value::Bool(true));
            }
        }
        Some(status)
    }

    fn reconstruct_cells(&self, doc: &Map<String, Value>) -> Option<Vec<f64>> {
        let nested = doc.get("voltages").and_then(Value::as_object);
        let channels = self.scan_locations(nested, doc, &["V"], &["V", "v"]);
        (!channels.is_empty()).then(|| channels.into_iter().map(|(_, value)| value).collect())
    }

    fn reconstruct_temperatures(&self, doc: &Map<String, Value>) -> Option<Vec<TemperatureReading>> {
        let nested = doc.get("temperatures").and_then(Value::as_object);
        let channels = self.scan_locations(nested, doc, &["T"], &["T", "t"]);
        (!channels.is_empty()).then(|| {
            channels
                .into_iter()
                .map(|(index, value)| TemperatureReading::new(index as i64, value))
                .collect()
        })
    }

    /// Scan both candidate locations in the configured order; the first
    /// one yielding at least one reading wins.
    fn scan_locations(
        &self,
        nested: Option<&Map<String, Value>>,
        root: &Map<String, Value>,
        nested_prefixes: &[&str],
        root_prefixes: &[&str],
    ) -> Vec<(usize, f64)> {
        let scan_nested = || {
            nested
                .map(|obj| scan_keyed_channels(obj, nested_prefixes))
                .unwrap_or_default()
        };
        let scan_root = || scan_keyed_channels(root, root_prefixes);

        match self.options.search_order {
            ChannelSearchOrder::NestedThenRoot => non_empty_or(scan_nested(), scan_root),
            ChannelSearchOrder::RootThenNested => non_empty_or(scan_root(), scan_nested),
        }
    }
}

fn non_empty_or(
    first: Vec<(usize, f64)>,
    fallback: impl FnOnce() -> Vec<(usize, f64)>,
) -> Vec<(usize, f64)> {
    if first.is_empty() { fallback() } else { first }
}

/// Collect keyed `P1..P32` readings in ascending index order. Returned
/// indices are zero-based. An unparsable entry is skipped without ending
/// the scan; a missing key ends it only past the contiguous scan depth.
fn scan_keyed_channels(obj: &Map<String, Value>, prefixes: &[&str]) -> Vec<(usize, f64)> {
    let mut readings = Vec::new();
    for i in 1..=MAX_KEYED_CHANNELS {
        let entry = prefixes
            .iter()
            .find_map(|prefix| obj.get(&format!("{prefix}{i}")));
        match entry {
            Some(value) => {
                if let Some(parsed) = parse_leading_num(value) {
                    readings.push((i - 1, parsed));
                }
            }
            None if i > CONTIGUOUS_SCAN_DEPTH => break,
            None => {}
        }
    }
    readings
}

fn synthesize_dashboard(doc: &Map<String, Value>) -> Map<String, Value> {
    let mut dash = Map::new();

    if let Some(raw) = doc.get("totalPackVoltage").or_else(|| doc.get("packVoltage")) {
        dash.insert("PackVoltage".to_string(), format_with_unit(raw, "V"));
    }
    if let Some(soc) = doc
        .get("SOC")
        .or_else(|| doc.get("soc"))
        .and_then(parse_num_strict)
    {
        dash.insert("SOC".to_string(), Value::from(soc.round() as i64));
    }
    let soh = doc
        .get("SOH")
        .or_else(|| doc.get("soh"))
        .and_then(parse_num_strict)
        .map_or(100, |v| v.round() as i64);
    dash.insert("SOH".to_string(), Value::from(soh));
    if let Some(raw) = doc.get("current").or_else(|| doc.get("CurrentAmps")) {
        dash.insert("CurrentAmps".to_string(), format_with_unit(raw, "A"));
    }

    dash
}

/// Two-decimal display string with a unit suffix; a non-numeric source
/// value passes through as a string unchanged.
fn format_with_unit(raw: &Value, unit: &str) -> Value {
    match parse_leading_num(raw) {
        Some(n) => Value::String(format!("{n:.2}{unit}")),
        None => match raw {
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        },
    }
}

fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => parse_leading_int(s),
        _ => None,
    }
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let mut end = 0;
    for (i, c) in s.char_indices() {
        match c {
            '-' | '+' if i == 0 => {}
            '0'..='9' => {}
            _ => break,
        }
        end = i + c.len_utf8();
    }
    s[..end].parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW_MS: i64 = 1_722_000_000_000;

    fn normalize(raw: Value) -> CanonicalPayload {
        Normalizer::default().normalize(raw, NOW_MS)
    }

    #[test]
    fn test_missing_timestamp_falls_back_to_ingestion_clock() {
        let payload = normalize(json!({}));
        assert_eq!(payload.timestamp_ms(), Some(NOW_MS));
    }

    #[test]
    fn test_timestamp_accepts_numeric_string() {
        let payload = normalize(json!({"timestamp": "1700000000123"}));
        assert_eq!(payload.timestamp_ms(), Some(1_700_000_000_123));
    }

    #[test]
    fn test_unparsable_timestamp_falls_back_to_ingestion_clock() {
        let payload = normalize(json!({"timestamp": "soon"}));
        assert_eq!(payload.timestamp_ms(), Some(NOW_MS));

        let payload = normalize(json!({"timestamp": true}));
        assert_eq!(payload.timestamp_ms(), Some(NOW_MS));
    }

    #[test]
    fn test_upstream_dashboard_is_never_overwritten() {
        let payload = normalize(json!({
            "dashboard": {"PackVoltage": "51.10V"},
            "totalPackVoltage": "48.32",
        }));
        let dash = payload.dashboard().unwrap();
        assert_eq!(dash.get("PackVoltage"), Some(&json!("51.10V")));
        assert!(dash.get("SOH").is_none());
    }

    #[test]
    fn test_dashboard_synthesis_formats_display_strings() {
        let payload = normalize(json!({
            "totalPackVoltage": "48.318",
            "SOC": 84.6,
            "current": -2.5,
        }));
        let dash = payload.dashboard().unwrap();
        assert_eq!(dash.get("PackVoltage"), Some(&json!("48.32V")));
        assert_eq!(dash.get("SOC"), Some(&json!(85)));
        assert_eq!(dash.get("SOH"), Some(&json!(100)));
        assert_eq!(dash.get("CurrentAmps"), Some(&json!("-2.50A")));
    }

    #[test]
    fn test_dashboard_synthesis_alternate_field_names() {
        let payload = normalize(json!({
            "packVoltage": 50.4,
            "soc": "79",
            "soh": 97.2,
            "CurrentAmps": "1.5",
        }));
        let dash = payload.dashboard().unwrap();
        assert_eq!(dash.get("PackVoltage"), Some(&json!("50.40V")));
        assert_eq!(dash.get("SOC"), Some(&json!(79)));
        assert_eq!(dash.get("SOH"), Some(&json!(97)));
        assert_eq!(dash.get("CurrentAmps"), Some(&json!("1.50A")));
    }

    #[test]
    fn test_non_numeric_pack_voltage_passes_through_as_string() {
        let payload = normalize(json!({"totalPackVoltage": "charging"}));
        let dash = payload.dashboard().unwrap();
        assert_eq!(dash.get("PackVoltage"), Some(&json!("charging")));
    }

    #[test]
    fn test_fault_flags_are_inverted() {
        let payload = normalize(json!({
            "faults": {"voltage": false, "current": true, "temperature": false},
        }));
        let status = payload.system_status().unwrap();
        assert_eq!(status.get("Overvoltage"), Some(&json!(true)));
        assert_eq!(status.get("Overcurrent"), Some(&json!(false)));
        assert_eq!(status.get("Overtemp"), Some(&json!(true)));
        assert_eq!(status.get("DeltaVoltage"), Some(&json!(true)));
    }

    #[test]
    fn test_fourth_flag_strategy_delta_voltage() {
        let normalizer = Normalizer::new(NormalizerOptions {
            fourth_flag: FourthFlagRule::DeltaVoltage,
            ..NormalizerOptions::default()
        });
        let payload = normalizer.normalize(json!({"faults": {"deltaVoltage": true}}), NOW_MS);
        let status = payload.system_status().unwrap();
        assert_eq!(status.get("DeltaVoltage"), Some(&json!(false)));
        assert!(status.get("ShortCircuit").is_none());
    }

    #[test]
    fn test_fourth_flag_strategy_short_circuit() {
        let normalizer = Normalizer::new(NormalizerOptions {
            fourth_flag: FourthFlagRule::ShortCircuit,
            ..NormalizerOptions::default()
        });
        let payload = normalizer.normalize(json!({"faults": {"voltage": true}}), NOW_MS);
        let status = payload.system_status().unwrap();
        assert_eq!(status.get("ShortCircuit"), Some(&json!(true)));
        assert!(status.get("DeltaVoltage").is_none());
        assert_eq!(status.get("Overvoltage"), Some(&json!(false)));
    }

    #[test]
    fn test_status_requires_faults_object() {
        let payload = normalize(json!({"totalPackVoltage": 48.0}));
        assert!(payload.system_status().is_none());
    }

    #[test]
    fn test_upstream_system_status_is_never_overwritten() {
        let payload = normalize(json!({
            "systemStatus": {"Overvoltage": false},
            "faults": {"voltage": false},
        }));
        let status = payload.system_status().unwrap();
        assert_eq!(status.get("Overvoltage"), Some(&json!(false)));
        assert!(status.get("Overcurrent").is_none());
    }

    #[test]
    fn test_cell_voltages_from_keyed_sub_object() {
        let payload = normalize(json!({
            "voltages": {"V1": "3.70", "V2": "3.65", "V3": "bad"},
        }));
        assert_eq!(
            payload.cell_voltages(),
            Some(&[json!(3.70), json!(3.65)][..])
        );
    }

    #[test]
    fn test_cell_scan_skips_gaps_within_contiguous_depth() {
        let payload = normalize(json!({
            "voltages": {"V1": 3.70, "V3": 3.60},
        }));
        assert_eq!(payload.cell_voltages(), Some(&[json!(3.70), json!(3.60)][..]));
    }

    #[test]
    fn test_cell_scan_stops_at_gap_past_contiguous_depth() {
        let mut voltages = Map::new();
        for i in 1..=8 {
            voltages.insert(format!("V{i}"), json!(3.5));
        }
        // V9 missing, V10 present: the scan must end at the gap.
        voltages.insert("V10".to_string(), json!(3.9));
        let payload = normalize(json!({"voltages": voltages}));
        assert_eq!(payload.cell_voltages().map(<[Value]>::len), Some(8));
    }

    #[test]
    fn test_cell_scan_honors_more_than_eight_contiguous_keys() {
        let mut voltages = Map::new();
        for i in 1..=16 {
            voltages.insert(format!("V{i}"), json!(3.5));
        }
        let payload = normalize(json!({"voltages": voltages}));
        assert_eq!(payload.cell_voltages().map(<[Value]>::len), Some(16));
    }

    #[test]
    fn test_cell_voltages_root_level_fallback_accepts_lowercase() {
        let payload = normalize(json!({"v1": "3.31", "V2": 3.29}));
        assert_eq!(
            payload.cell_voltages(),
            Some(&[json!(3.31), json!(3.29)][..])
        );
    }

    #[test]
    fn test_channel_search_order_root_then_nested() {
        let normalizer = Normalizer::new(NormalizerOptions {
            search_order: ChannelSearchOrder::RootThenNested,
            ..NormalizerOptions::default()
        });
        let payload = normalizer.normalize(
            json!({"V1": 3.10, "voltages": {"V1": 3.90}}),
            NOW_MS,
        );
        assert_eq!(payload.cell_voltages(), Some(&[json!(3.10)][..]));
    }

    #[test]
    fn test_existing_cell_voltage_array_is_untouched() {
        let payload = normalize(json!({
            "cellVoltages": ["3.70", 3.65],
            "voltages": {"V1": 9.9},
        }));
        assert_eq!(
            payload.cell_voltages(),
            Some(&[json!("3.70"), json!(3.65)][..])
        );
    }

    #[test]
    fn test_all_unparsable_cells_leave_payload_without_array() {
        let payload = normalize(json!({"voltages": {"V1": "bad", "V2": null}}));
        assert!(payload.cell_voltages().is_none());
    }

    #[test]
    fn test_temperatures_from_keyed_sub_object() {
        let payload = normalize(json!({
            "temperatures": {"T1": 25.5, "T2": 31.0},
        }));
        assert_eq!(
            payload.temperatures(),
            Some(&[json!({"time": 0, "value": 25.5}), json!({"time": 1, "value": 31.0})][..])
        );
    }

    #[test]
    fn test_temperatures_root_level_fallback() {
        let payload = normalize(json!({"T1": "22.5", "t2": 23.5}));
        assert_eq!(
            payload.temperatures(),
            Some(&[json!({"time": 0, "value": 22.5}), json!({"time": 1, "value": 23.5})][..])
        );
    }

    #[test]
    fn test_non_object_input_passes_through_unchanged() {
        let payload = Normalizer::default().normalize(json!("garbled"), NOW_MS);
        assert_eq!(payload.as_value(), &json!("garbled"));
    }

    #[test]
    fn test_unrecognized_fields_are_preserved() {
        let payload = normalize(json!({
            "totalPackVoltage": 48.0,
            "fans": {"F1": "on"},
            "vMax": 3.71,
            "tMin": 19.5,
        }));
        assert_eq!(payload.as_value().get("fans"), Some(&json!({"F1": "on"})));
        assert_eq!(payload.as_value().get("vMax"), Some(&json!(3.71)));
        assert_eq!(payload.as_value().get("tMin"), Some(&json!(19.5)));
    }
}
