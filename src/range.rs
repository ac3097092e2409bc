//! Range validation for programmed values.
//!
//! Every settable quantity has two tiers of validity:
//!
//! * __Always__ - the value lies inside the supply's hardware envelope for that quantity.
//! * __Presently__ - the value also respects the live value of a related quantity. The
//!   supply's firmware enforces
//!   `UVL ⪅ Voltage × 0.95 ⪅ Voltage ⪅ Voltage × 1.05 ⪅ OVP`
//!   and refuses writes that would break it.
//!
//! The presently tier needs a fresh read of the related quantity; these functions are pure and
//! take that reading as an argument. See [`crate::session::DeviceSession::program_voltage_window`]
//! for an ordering of writes that never trips the presently tier.

use thiserror::Error;

/// Under-voltage limit must stay at or below this fraction of the programmed voltage.
pub const UVL_RATIO: f64 = 0.95;
/// Over-voltage protection must stay at or above this multiple of the programmed voltage.
pub const OVP_RATIO: f64 = 1.05;
/// Half of the smallest step the wire format can express.
///
/// The supply reports live values rounded to three decimals, so presently-valid bounds are
/// compared with this much slack.
pub const RESOLUTION: f64 = 0.0005;

/// Inclusive `[min, max]` range of one quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `NaN` is never contained.
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    fn contains_within(&self, value: f64, slack: f64) -> bool {
        self.min - slack <= value && value <= self.max + slack
    }
}

impl core::fmt::Display for Range {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "[{:.3}..{:.3}]", self.min, self.max)
    }
}

/// The settable quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Quantity {
    #[strum(to_string = "Voltage")]
    Voltage,
    #[strum(to_string = "Current")]
    Current,
    #[strum(to_string = "Over-Voltage")]
    OverVoltageProtection,
    #[strum(to_string = "Under-Voltage")]
    UnderVoltageLimit,
}

/// Which validity tier a value failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum RangeKind {
    #[strum(to_string = "always")]
    Always,
    #[strum(to_string = "presently")]
    Presently,
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("Invalid {quantity} {value}, must {kind} be in range {range}")]
pub struct RangeViolation {
    pub quantity: Quantity,
    pub kind: RangeKind,
    pub value: f64,
    pub range: Range,
}

type Validation = core::result::Result<(), RangeViolation>;

/// The always tier on its own, for quantities without a cross-field rule (current).
pub fn validate_always(quantity: Quantity, value: f64, envelope: Range) -> Validation {
    if envelope.contains(value) {
        Ok(())
    } else {
        Err(RangeViolation {
            quantity,
            kind: RangeKind::Always,
            value,
            range: envelope,
        })
    }
}

fn validate_presently(quantity: Quantity, value: f64, range: Range) -> Validation {
    if range.contains_within(value, RESOLUTION) {
        Ok(())
    } else {
        Err(RangeViolation {
            quantity,
            kind: RangeKind::Presently,
            value,
            range,
        })
    }
}

/// `UVL / 0.95 ≤ V ≤ OVP / 1.05` against the live protection settings.
pub fn validate_voltage(volts: f64, envelope: Range, uvl_now: f64, ovp_now: f64) -> Validation {
    validate_always(Quantity::Voltage, volts, envelope)?;
    let presently = Range::new(uvl_now / UVL_RATIO, ovp_now / OVP_RATIO);
    validate_presently(Quantity::Voltage, volts, presently)
}

/// `V × 1.05 ≤ OVP ≤ OVP.MAX` against the live programmed voltage.
pub fn validate_over_voltage(volts: f64, envelope: Range, voltage_now: f64) -> Validation {
    validate_always(Quantity::OverVoltageProtection, volts, envelope)?;
    let presently = Range::new(voltage_now * OVP_RATIO, envelope.max);
    validate_presently(Quantity::OverVoltageProtection, volts, presently)
}

/// `UVL.min ≤ UVL ≤ V × 0.95` against the live programmed voltage.
pub fn validate_under_voltage(volts: f64, envelope: Range, voltage_now: f64) -> Validation {
    validate_always(Quantity::UnderVoltageLimit, volts, envelope)?;
    let presently = Range::new(envelope.min, voltage_now * UVL_RATIO);
    validate_presently(Quantity::UnderVoltageLimit, volts, presently)
}

/// Render a value the way every programmed voltage, current and protection level goes on the
/// wire: fixed point with exactly three decimals.
pub fn format_value(value: f64) -> String {
    format!("{value:.3}")
}

/// [`format_value`] zero padded to six characters, as group commands expect (`05.000`).
pub fn format_group_value(value: f64) -> String {
    format!("{value:0>6.3}")
}
