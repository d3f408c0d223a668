//! Launch result record (tag 4, "Results").
//!
//! Wire layout is a single positional array:
//!
//! ```text
//! [carry, speed, launch_angle, side_angle, back_spin, side_spin,
//!  confidence, club, kind, message|nil, [log lines...]|nil]
//! ```
//!
//! Elements 0..=8 are required. Element 9 may be nil or absent, element 10 may
//! be nil or absent. Extra trailing elements are ignored.

use serde::Serialize;

use crate::codec::{self, Value};
use crate::error::{DecodeError, Result};

/// Number of leading elements every record must carry.
pub const REQUIRED_ELEMENTS: usize = 9;

/// Classification of a result record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ResultKind {
    #[default]
    Unknown = 0,
    Initializing = 1,
    WaitingForBallToAppear = 2,
    PausingForStabilization = 3,
    MultipleBallsPresent = 4,
    BallPlacedReadyForHit = 5,
    Hit = 6,
    Error = 7,
    CalibrationResults = 8,
}

impl ResultKind {
    pub const ALL: [ResultKind; 9] = [
        ResultKind::Unknown,
        ResultKind::Initializing,
        ResultKind::WaitingForBallToAppear,
        ResultKind::PausingForStabilization,
        ResultKind::MultipleBallsPresent,
        ResultKind::BallPlacedReadyForHit,
        ResultKind::Hit,
        ResultKind::Error,
        ResultKind::CalibrationResults,
    ];

    pub fn from_ordinal(n: i64) -> Option<Self> {
        usize::try_from(n).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Operator-facing description.
    pub fn description(self) -> &'static str {
        match self {
            ResultKind::Unknown => "Unknown",
            ResultKind::Initializing => "Initializing launch monitor",
            ResultKind::WaitingForBallToAppear => "Waiting for ball to appear in view frame",
            ResultKind::PausingForStabilization => "Pausing for the placed ball to stabilize",
            ResultKind::MultipleBallsPresent => "Multiple balls present",
            ResultKind::BallPlacedReadyForHit => "Ball placed and ready to be hit",
            ResultKind::Hit => "Ball hit",
            ResultKind::Error => "Error",
            ResultKind::CalibrationResults => "Calibration results",
        }
    }
}

/// Club selected on the launch monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ClubType {
    #[default]
    NotSelected = 0,
    Driver = 1,
    Iron = 2,
    Putter = 3,
}

impl ClubType {
    pub const ALL: [ClubType; 4] = [
        ClubType::NotSelected,
        ClubType::Driver,
        ClubType::Iron,
        ClubType::Putter,
    ];

    pub fn from_ordinal(n: i64) -> Option<Self> {
        usize::try_from(n).ok().and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            ClubType::NotSelected => "Not selected",
            ClubType::Driver => "Driver",
            ClubType::Iron => "Iron",
            ClubType::Putter => "Putter",
        }
    }
}

/// One decoded launch monitor result.
///
/// `Default` is the "no data" record: zero measurements, `Unknown` kind,
/// no club selected.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LaunchResult {
    /// Carry distance (m)
    pub carry_meters: i32,
    /// Ball speed (m/s)
    pub speed_mps: f64,
    /// Vertical launch angle (deg)
    pub launch_angle_deg: f64,
    /// Horizontal launch angle (deg)
    pub side_angle_deg: f64,
    /// Backspin (RPM)
    pub back_spin_rpm: i32,
    /// Sidespin (RPM); the sign gives the spin direction.
    pub side_spin_rpm: i32,
    /// Measurement confidence (0-10)
    pub confidence: i32,
    pub club_type: ClubType,
    pub kind: ResultKind,
    pub message: Option<String>,
    pub log_lines: Vec<String>,
}

impl LaunchResult {
    /// Nothing on screen worth protecting: no measured speed and not an error.
    pub fn is_idle(&self) -> bool {
        self.speed_mps <= 0.0 && self.kind != ResultKind::Error
    }

    /// Worth displacing a result the operator is still reading.
    ///
    /// A measured speed always is. Without one, only a re-teed ball, a
    /// (re)initialisation or a new error qualify; "waiting" and similar
    /// chatter do not.
    pub fn is_informative(&self) -> bool {
        !(self.speed_mps <= 0.0
            && !matches!(
                self.kind,
                ResultKind::BallPlacedReadyForHit | ResultKind::Initializing | ResultKind::Error
            ))
    }

    /// Decode a record from its wire payload.
    ///
    /// Either every field decodes or an error is returned; there is no
    /// partially populated result.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let value = codec::read_value(payload)?;
        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(DecodeError::NotAnArray {
                    found: other.type_name(),
                });
            }
        };
        if items.len() < REQUIRED_ELEMENTS {
            return Err(DecodeError::TooFewElements {
                need: REQUIRED_ELEMENTS,
                got: items.len(),
            });
        }

        let club = int_element(&items, 7, "club_type")?;
        let kind = int_element(&items, 8, "kind")?;

        Ok(Self {
            carry_meters: i32_element(&items, 0, "carry_meters")?,
            speed_mps: number_element(&items, 1, "speed_mps")?,
            launch_angle_deg: number_element(&items, 2, "launch_angle_deg")?,
            side_angle_deg: number_element(&items, 3, "side_angle_deg")?,
            back_spin_rpm: i32_element(&items, 4, "back_spin_rpm")?,
            side_spin_rpm: i32_element(&items, 5, "side_spin_rpm")?,
            confidence: i32_element(&items, 6, "confidence")?,
            club_type: ClubType::from_ordinal(club).ok_or(DecodeError::OutOfRange {
                field: "club_type",
                value: club,
            })?,
            kind: ResultKind::from_ordinal(kind).ok_or(DecodeError::OutOfRange {
                field: "kind",
                value: kind,
            })?,
            message: message_element(&items)?,
            log_lines: log_lines_element(&items)?,
        })
    }

    /// Encode as the 11-element positional array.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        codec::write_array_len(&mut buf, 11);
        codec::write_int(&mut buf, i64::from(self.carry_meters));
        codec::write_float(&mut buf, self.speed_mps);
        codec::write_float(&mut buf, self.launch_angle_deg);
        codec::write_float(&mut buf, self.side_angle_deg);
        codec::write_int(&mut buf, i64::from(self.back_spin_rpm));
        codec::write_int(&mut buf, i64::from(self.side_spin_rpm));
        codec::write_int(&mut buf, i64::from(self.confidence));
        codec::write_int(&mut buf, i64::from(self.club_type.ordinal()));
        codec::write_int(&mut buf, i64::from(self.kind.ordinal()));
        match &self.message {
            Some(m) => codec::write_str(&mut buf, m),
            None => codec::write_nil(&mut buf),
        }
        codec::write_array_len(&mut buf, self.log_lines.len());
        for line in &self.log_lines {
            codec::write_str(&mut buf, line);
        }
        buf
    }
}

// ---------------------------------------------------------------------------
// Element helpers
// ---------------------------------------------------------------------------

fn type_error(index: usize, field: &'static str, expected: &'static str, found: &Value) -> DecodeError {
    DecodeError::FieldType {
        index,
        field,
        expected,
        found: found.type_name(),
    }
}

fn int_element(items: &[Value], index: usize, field: &'static str) -> Result<i64> {
    let v = &items[index];
    v.as_int().ok_or_else(|| type_error(index, field, "integer", v))
}

fn i32_element(items: &[Value], index: usize, field: &'static str) -> Result<i32> {
    let raw = int_element(items, index, field)?;
    i32::try_from(raw).map_err(|_| DecodeError::OutOfRange { field, value: raw })
}

fn number_element(items: &[Value], index: usize, field: &'static str) -> Result<f64> {
    let v = &items[index];
    v.as_number()
        .ok_or_else(|| type_error(index, field, "integer or float", v))
}

fn message_element(items: &[Value]) -> Result<Option<String>> {
    match items.get(9) {
        None | Some(Value::Nil) => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.clone())),
        Some(other) => Err(type_error(9, "message", "string or nil", other)),
    }
}

fn log_lines_element(items: &[Value]) -> Result<Vec<String>> {
    match items.get(10) {
        None | Some(Value::Nil) => Ok(Vec::new()),
        Some(Value::Array(lines)) => lines
            .iter()
            .map(|line| {
                line.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| type_error(10, "log_lines", "array of strings", line))
            })
            .collect(),
        Some(other) => Err(type_error(10, "log_lines", "array of strings or nil", other)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::write_value;

    fn pack(items: Vec<Value>) -> Vec<u8> {
        let mut buf = Vec::new();
        write_value(&mut buf, &Value::Array(items));
        buf
    }

    fn hit_elements() -> Vec<Value> {
        vec![
            Value::Int(182),
            Value::Float(67.4),
            Value::Float(11.5),
            Value::Float(-2.25),
            Value::Int(2650),
            Value::Int(-340),
            Value::Int(8),
            Value::Int(1),
            Value::Int(6),
            Value::Str("Ball hit".into()),
            Value::Array(vec![Value::Str("spin ok".into()), Value::Str("exposures: 9".into())]),
        ]
    }

    #[test]
    fn decode_full_record() {
        let r = LaunchResult::decode(&pack(hit_elements())).unwrap();
        assert_eq!(r.carry_meters, 182);
        assert!((r.speed_mps - 67.4).abs() < 1e-9);
        assert!((r.launch_angle_deg - 11.5).abs() < 1e-9);
        assert!((r.side_angle_deg + 2.25).abs() < 1e-9);
        assert_eq!(r.back_spin_rpm, 2650);
        assert_eq!(r.side_spin_rpm, -340);
        assert_eq!(r.confidence, 8);
        assert_eq!(r.club_type, ClubType::Driver);
        assert_eq!(r.kind, ResultKind::Hit);
        assert_eq!(r.message.as_deref(), Some("Ball hit"));
        assert_eq!(r.log_lines, vec!["spin ok", "exposures: 9"]);
    }

    #[test]
    fn integer_and_float_speed_decode_identically() {
        let mut as_int = hit_elements();
        as_int[1] = Value::Int(5);
        let mut as_float = hit_elements();
        as_float[1] = Value::Float(5.0);

        let a = LaunchResult::decode(&pack(as_int)).unwrap();
        let b = LaunchResult::decode(&pack(as_float)).unwrap();
        assert_eq!(a.speed_mps, 5.0);
        assert_eq!(a, b);
    }

    #[test]
    fn integer_angles_accepted() {
        let mut items = hit_elements();
        items[2] = Value::Int(12);
        items[3] = Value::Int(-3);
        let r = LaunchResult::decode(&pack(items)).unwrap();
        assert_eq!(r.launch_angle_deg, 12.0);
        assert_eq!(r.side_angle_deg, -3.0);
    }

    #[test]
    fn nil_message_and_logs() {
        let mut items = hit_elements();
        items[9] = Value::Nil;
        items[10] = Value::Nil;
        let r = LaunchResult::decode(&pack(items)).unwrap();
        assert_eq!(r.message, None);
        assert!(r.log_lines.is_empty());
    }

    #[test]
    fn ten_elements_without_logs() {
        let mut items = hit_elements();
        items.truncate(10);
        let r = LaunchResult::decode(&pack(items)).unwrap();
        assert_eq!(r.message.as_deref(), Some("Ball hit"));
        assert!(r.log_lines.is_empty());
    }

    #[test]
    fn missing_required_element() {
        let mut items = hit_elements();
        items.truncate(8);
        assert!(matches!(
            LaunchResult::decode(&pack(items)),
            Err(DecodeError::TooFewElements { need: 9, got: 8 })
        ));
    }

    #[test]
    fn top_level_scalar_rejected() {
        let mut buf = Vec::new();
        codec::write_int(&mut buf, 42);
        assert!(matches!(
            LaunchResult::decode(&buf),
            Err(DecodeError::NotAnArray { found: "integer" })
        ));
    }

    #[test]
    fn wrong_element_type() {
        let mut items = hit_elements();
        items[4] = Value::Float(2650.0);
        assert!(matches!(
            LaunchResult::decode(&pack(items)),
            Err(DecodeError::FieldType { index: 4, field: "back_spin_rpm", .. })
        ));

        let mut items = hit_elements();
        items[1] = Value::Str("fast".into());
        assert!(matches!(
            LaunchResult::decode(&pack(items)),
            Err(DecodeError::FieldType { index: 1, .. })
        ));
    }

    #[test]
    fn bad_message_and_log_types() {
        let mut items = hit_elements();
        items[9] = Value::Int(3);
        assert!(matches!(
            LaunchResult::decode(&pack(items)),
            Err(DecodeError::FieldType { index: 9, .. })
        ));

        let mut items = hit_elements();
        items[10] = Value::Array(vec![Value::Str("ok".into()), Value::Int(1)]);
        assert!(matches!(
            LaunchResult::decode(&pack(items)),
            Err(DecodeError::FieldType { index: 10, .. })
        ));
    }

    #[test]
    fn ordinal_out_of_range() {
        let mut items = hit_elements();
        items[7] = Value::Int(4);
        assert!(matches!(
            LaunchResult::decode(&pack(items)),
            Err(DecodeError::OutOfRange { field: "club_type", value: 4 })
        ));

        let mut items = hit_elements();
        items[8] = Value::Int(9);
        assert!(matches!(
            LaunchResult::decode(&pack(items)),
            Err(DecodeError::OutOfRange { field: "kind", value: 9 })
        ));

        let mut items = hit_elements();
        items[8] = Value::Int(-1);
        assert!(LaunchResult::decode(&pack(items)).is_err());
    }

    #[test]
    fn carry_outside_i32() {
        let mut items = hit_elements();
        items[0] = Value::Int(i64::from(i32::MAX) + 1);
        assert!(matches!(
            LaunchResult::decode(&pack(items)),
            Err(DecodeError::OutOfRange { field: "carry_meters", .. })
        ));
    }

    #[test]
    fn extra_elements_ignored() {
        let mut items = hit_elements();
        items.push(Value::Int(99));
        assert!(LaunchResult::decode(&pack(items)).is_ok());
    }

    #[test]
    fn encode_then_decode() {
        let r = LaunchResult {
            carry_meters: 140,
            speed_mps: 52.75,
            launch_angle_deg: 17.0,
            side_angle_deg: 1.5,
            back_spin_rpm: 6100,
            side_spin_rpm: 220,
            confidence: 7,
            club_type: ClubType::Iron,
            kind: ResultKind::Hit,
            message: None,
            log_lines: vec!["line".into()],
        };
        assert_eq!(LaunchResult::decode(&r.encode()).unwrap(), r);
        assert_eq!(
            LaunchResult::decode(&LaunchResult::default().encode()).unwrap(),
            LaunchResult::default()
        );
    }

    #[test]
    fn idle_and_informative() {
        let idle = LaunchResult::default();
        assert!(idle.is_idle());
        assert!(!idle.is_informative());

        let err = LaunchResult {
            kind: ResultKind::Error,
            ..Default::default()
        };
        assert!(!err.is_idle());
        assert!(err.is_informative());

        let placed = LaunchResult {
            kind: ResultKind::BallPlacedReadyForHit,
            ..Default::default()
        };
        assert!(placed.is_idle());
        assert!(placed.is_informative());

        let calibration = LaunchResult {
            kind: ResultKind::CalibrationResults,
            ..Default::default()
        };
        assert!(!calibration.is_informative());

        let hit = LaunchResult {
            speed_mps: 0.5,
            kind: ResultKind::WaitingForBallToAppear,
            ..Default::default()
        };
        assert!(!hit.is_idle());
        assert!(hit.is_informative());
    }

    #[test]
    fn ordinals_round_trip() {
        for kind in ResultKind::ALL {
            assert_eq!(ResultKind::from_ordinal(i64::from(kind.ordinal())), Some(kind));
        }
        for club in ClubType::ALL {
            assert_eq!(ClubType::from_ordinal(i64::from(club.ordinal())), Some(club));
        }
    }
}
