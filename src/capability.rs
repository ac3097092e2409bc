//! Operating envelopes for the different Genesys models.
//!
//! The rated voltage and current of a supply come from its identity string. Its over-voltage
//! protection and under-voltage limit ranges depend only on the voltage class, and are looked
//! up from the fixed tables in this module (Genesys manual tables 7.6 & 7.7).

use strum_macros::EnumIter;

use crate::range::Range;

/// Voltage classes of the Genesys family. `Gen40` covers every `GEN40-*` model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum ModelClass {
    Gen6,
    Gen8,
    Gen12_5,
    Gen20,
    Gen30,
    Gen40,
    Gen60,
    Gen80,
    Gen100,
    Gen150,
    Gen300,
    Gen600,
}

/// OVP and UVL ranges for one voltage class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectionLimits {
    pub over_voltage: Range,
    pub under_voltage: Range,
}

impl ProtectionLimits {
    const fn new(ovp_min: f64, ovp_max: f64, uvl_max: f64) -> Self {
        Self {
            over_voltage: Range::new(ovp_min, ovp_max),
            under_voltage: Range::new(0.0, uvl_max),
        }
    }
}

impl ModelClass {
    /// Rated output voltage of this class.
    pub const fn rated_voltage(&self) -> f64 {
        match self {
            ModelClass::Gen6 => 6.0,
            ModelClass::Gen8 => 8.0,
            ModelClass::Gen12_5 => 12.5,
            ModelClass::Gen20 => 20.0,
            ModelClass::Gen30 => 30.0,
            ModelClass::Gen40 => 40.0,
            ModelClass::Gen60 => 60.0,
            ModelClass::Gen80 => 80.0,
            ModelClass::Gen100 => 100.0,
            ModelClass::Gen150 => 150.0,
            ModelClass::Gen300 => 300.0,
            ModelClass::Gen600 => 600.0,
        }
    }

    /// Find the class with exactly this rated voltage.
    pub fn from_rated_voltage(volts: f64) -> Option<Self> {
        use strum::IntoEnumIterator;
        ModelClass::iter().find(|class| class.rated_voltage() == volts)
    }

    /// UVL MAX is roughly 95% of the rated voltage.
    pub const fn protection_limits(&self) -> ProtectionLimits {
        match self {
            ModelClass::Gen6 => ProtectionLimits::new(0.5, 7.5, 5.7),
            ModelClass::Gen8 => ProtectionLimits::new(0.5, 10.0, 7.6),
            ModelClass::Gen12_5 => ProtectionLimits::new(1.0, 15.0, 11.9),
            ModelClass::Gen20 => ProtectionLimits::new(1.0, 24.0, 19.0),
            ModelClass::Gen30 => ProtectionLimits::new(2.0, 36.0, 28.5),
            ModelClass::Gen40 => ProtectionLimits::new(2.0, 44.0, 38.0),
            ModelClass::Gen60 => ProtectionLimits::new(5.0, 66.0, 57.0),
            ModelClass::Gen80 => ProtectionLimits::new(5.0, 88.0, 76.0),
            ModelClass::Gen100 => ProtectionLimits::new(5.0, 110.0, 95.0),
            ModelClass::Gen150 => ProtectionLimits::new(5.0, 165.0, 142.0),
            ModelClass::Gen300 => ProtectionLimits::new(5.0, 330.0, 285.0),
            ModelClass::Gen600 => ProtectionLimits::new(5.0, 660.0, 570.0),
        }
    }
}

/// Ratings parsed from an `IDN?` reply such as `LAMBDA,GEN40-38`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rating {
    pub voltage: f64,
    pub current: f64,
}

impl Rating {
    /// Returns `None` when the reply carries no `GEN{volts}-{amps}` token.
    pub fn parse(identity: &str) -> Option<Self> {
        let model = &identity[identity.find("GEN")? + 3..];
        let model = model.split([',', ' ']).next()?;
        let (volts, amps) = model.split_once('-')?;
        Some(Self {
            voltage: volts.trim().parse().ok()?,
            current: amps.trim().parse().ok()?,
        })
    }
}

/// The four ranges one particular supply may be programmed within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapabilityEnvelope {
    pub class: ModelClass,
    pub voltage: Range,
    pub current: Range,
    pub over_voltage: Range,
    pub under_voltage: Range,
}

impl CapabilityEnvelope {
    pub fn new(rating: Rating) -> Option<Self> {
        let class = ModelClass::from_rated_voltage(rating.voltage)?;
        let limits = class.protection_limits();
        Some(Self {
            class,
            voltage: Range::new(0.0, rating.voltage),
            current: Range::new(0.0, rating.current),
            over_voltage: limits.over_voltage,
            under_voltage: limits.under_voltage,
        })
    }

    /// Build the envelope straight from an `IDN?` reply.
    pub fn from_identity(identity: &str) -> Option<Self> {
        Self::new(Rating::parse(identity)?)
    }
}
