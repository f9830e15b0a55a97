//! Unit value codecs
//!
//! Physical quantities travel across the bridge in two shapes: a tagged
//! `{value, unit}` pair on the way in, and an expanded object listing the value
//! in every supported unit (`inGrams`, `inKilograms`, ...) on the way out.
//!
//! Each quantity keeps one canonical value. Units are affine conversions to that
//! canonical value, so temperature fits the same table as the linear kinds.

use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::BridgeError;

/// Quantity families understood by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuantityKind {
    Mass,
    Temperature,
    Pressure,
    Length,
    Volume,
    Energy,
    Velocity,
    Power,
    BloodGlucose,
}

impl QuantityKind {
    pub const ALL: [QuantityKind; 9] = [
        QuantityKind::Mass,
        QuantityKind::Temperature,
        QuantityKind::Pressure,
        QuantityKind::Length,
        QuantityKind::Volume,
        QuantityKind::Energy,
        QuantityKind::Velocity,
        QuantityKind::Power,
        QuantityKind::BloodGlucose,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuantityKind::Mass => "mass",
            QuantityKind::Temperature => "temperature",
            QuantityKind::Pressure => "pressure",
            QuantityKind::Length => "length",
            QuantityKind::Volume => "volume",
            QuantityKind::Energy => "energy",
            QuantityKind::Velocity => "velocity",
            QuantityKind::Power => "power",
            QuantityKind::BloodGlucose => "bloodGlucose",
        }
    }

    /// Human label used in error messages
    pub fn label(&self) -> &'static str {
        match self {
            QuantityKind::Mass => "Mass",
            QuantityKind::Temperature => "Temperature",
            QuantityKind::Pressure => "Pressure",
            QuantityKind::Length => "Length",
            QuantityKind::Volume => "Volume",
            QuantityKind::Energy => "Energy",
            QuantityKind::Velocity => "Velocity",
            QuantityKind::Power => "Power",
            QuantityKind::BloodGlucose => "Blood glucose level",
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            QuantityKind::Mass => "INVALID_MASS",
            QuantityKind::Temperature => "INVALID_TEMPERATURE",
            QuantityKind::Pressure => "INVALID_PRESSURE",
            QuantityKind::Length => "INVALID_LENGTH",
            QuantityKind::Volume => "INVALID_VOLUME",
            QuantityKind::Energy => "INVALID_ENERGY",
            QuantityKind::Velocity => "INVALID_VELOCITY",
            QuantityKind::Power => "INVALID_POWER",
            QuantityKind::BloodGlucose => "INVALID_BLOOD_GLUCOSE_LEVEL",
        }
    }
}

impl fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuantityKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuantityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| BridgeError::invalid_argument(format!("Unknown quantity kind: {s}")))
    }
}

/// One wire unit: `canonical = (value + offset) * scale`
#[derive(Debug, Clone, Copy)]
pub struct UnitSpec {
    /// Wire tag accepted in `{value, unit}`
    pub name: &'static str,
    /// Key used in the expanded result
    pub key: &'static str,
    scale: f64,
    offset: f64,
}

impl UnitSpec {
    const fn linear(name: &'static str, key: &'static str, scale: f64) -> Self {
        Self {
            name,
            key,
            scale,
            offset: 0.0,
        }
    }

    const fn affine(name: &'static str, key: &'static str, scale: f64, offset: f64) -> Self {
        Self {
            name,
            key,
            scale,
            offset,
        }
    }

    fn to_canonical(&self, value: f64) -> f64 {
        (value + self.offset) * self.scale
    }

    fn from_canonical(&self, canonical: f64) -> f64 {
        canonical / self.scale - self.offset
    }
}

/// Unknown tags resolve to the first (default) unit of the table
fn unit_spec(units: &'static [UnitSpec], unit: &str) -> &'static UnitSpec {
    units.iter().find(|u| u.name == unit).unwrap_or(&units[0])
}

/// A physical quantity with a canonical internal value.
///
/// `UNITS` must be non-empty; its first entry is the fallback for
/// unrecognized unit tags.
pub trait Quantity: Sized + Copy {
    const KIND: QuantityKind;
    const UNITS: &'static [UnitSpec];

    fn from_canonical(value: f64) -> Self;
    fn canonical(&self) -> f64;

    fn from_unit(value: f64, unit: &str) -> Self {
        Self::from_canonical(unit_spec(Self::UNITS, unit).to_canonical(value))
    }

    fn value_in(&self, unit: &str) -> f64 {
        unit_spec(Self::UNITS, unit).from_canonical(self.canonical())
    }
}

/// Decode a `{value, unit}` wire object.
///
/// A missing/null object or a non-numeric value fails with the kind-specific
/// `InvalidQuantity`; an unknown or missing unit falls back to the default unit.
pub fn decode<Q: Quantity>(wire: Option<&Value>) -> Result<Q, BridgeError> {
    let object = wire
        .and_then(Value::as_object)
        .ok_or(BridgeError::InvalidQuantity(Q::KIND))?;
    let value = object
        .get("value")
        .and_then(Value::as_f64)
        .ok_or(BridgeError::InvalidQuantity(Q::KIND))?;
    let unit = object.get("unit").and_then(Value::as_str).unwrap_or_default();

    Ok(Q::from_unit(value, unit))
}

/// Expand a quantity into every supported unit; `None` expands to zeros
pub fn encode<Q: Quantity>(quantity: Option<&Q>) -> Value {
    let mut map = Map::new();
    for unit in Q::UNITS {
        let value = quantity.map(|q| q.value_in(unit.name)).unwrap_or(0.0);
        map.insert(unit.key.to_string(), Value::from(value));
    }
    Value::Object(map)
}

/// Decode then expand a wire quantity of the given kind
pub fn expand_quantity(kind: QuantityKind, wire: Option<&Value>) -> Result<Value, BridgeError> {
    Ok(match kind {
        QuantityKind::Mass => encode(Some(&decode::<Mass>(wire)?)),
        QuantityKind::Temperature => encode(Some(&decode::<Temperature>(wire)?)),
        QuantityKind::Pressure => encode(Some(&decode::<Pressure>(wire)?)),
        QuantityKind::Length => encode(Some(&decode::<Length>(wire)?)),
        QuantityKind::Volume => encode(Some(&decode::<Volume>(wire)?)),
        QuantityKind::Energy => encode(Some(&decode::<Energy>(wire)?)),
        QuantityKind::Velocity => encode(Some(&decode::<Velocity>(wire)?)),
        QuantityKind::Power => encode(Some(&decode::<Power>(wire)?)),
        QuantityKind::BloodGlucose => encode(Some(&decode::<BloodGlucose>(wire)?)),
    })
}

/// Mass, canonical unit grams
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Mass {
    grams: f64,
}

impl Mass {
    pub fn grams(value: f64) -> Self {
        Self { grams: value }
    }

    pub fn kilograms(value: f64) -> Self {
        Self::from_unit(value, "kilograms")
    }

    pub fn in_grams(&self) -> f64 {
        self.grams
    }

    pub fn in_kilograms(&self) -> f64 {
        self.value_in("kilograms")
    }

    pub fn in_pounds(&self) -> f64 {
        self.value_in("pounds")
    }
}

impl Quantity for Mass {
    const KIND: QuantityKind = QuantityKind::Mass;
    const UNITS: &'static [UnitSpec] = &[
        UnitSpec::linear("grams", "inGrams", 1.0),
        UnitSpec::linear("kilograms", "inKilograms", 1_000.0),
        UnitSpec::linear("milligrams", "inMilligrams", 0.001),
        UnitSpec::linear("micrograms", "inMicrograms", 0.000_001),
        UnitSpec::linear("ounces", "inOunces", 28.349_523_125),
        UnitSpec::linear("pounds", "inPounds", 453.592_37),
    ];

    fn from_canonical(value: f64) -> Self {
        Self { grams: value }
    }

    fn canonical(&self) -> f64 {
        self.grams
    }
}

/// Temperature, canonical unit degrees celsius
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Temperature {
    celsius: f64,
}

impl Temperature {
    pub fn celsius(value: f64) -> Self {
        Self { celsius: value }
    }

    pub fn fahrenheit(value: f64) -> Self {
        Self::from_unit(value, "fahrenheit")
    }

    pub fn in_celsius(&self) -> f64 {
        self.celsius
    }

    pub fn in_fahrenheit(&self) -> f64 {
        self.value_in("fahrenheit")
    }
}

impl Quantity for Temperature {
    const KIND: QuantityKind = QuantityKind::Temperature;
    const UNITS: &'static [UnitSpec] = &[
        UnitSpec::linear("celsius", "inCelsius", 1.0),
        UnitSpec::affine("fahrenheit", "inFahrenheit", 5.0 / 9.0, -32.0),
    ];

    fn from_canonical(value: f64) -> Self {
        Self { celsius: value }
    }

    fn canonical(&self) -> f64 {
        self.celsius
    }
}

/// Pressure, canonical unit millimeters of mercury
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Pressure {
    mmhg: f64,
}

impl Pressure {
    pub fn millimeters_of_mercury(value: f64) -> Self {
        Self { mmhg: value }
    }

    pub fn in_millimeters_of_mercury(&self) -> f64 {
        self.mmhg
    }
}

impl Quantity for Pressure {
    const KIND: QuantityKind = QuantityKind::Pressure;
    const UNITS: &'static [UnitSpec] = &[UnitSpec::linear(
        "millimetersOfMercury",
        "inMillimetersOfMercury",
        1.0,
    )];

    fn from_canonical(value: f64) -> Self {
        Self { mmhg: value }
    }

    fn canonical(&self) -> f64 {
        self.mmhg
    }
}

/// Length, canonical unit meters
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Length {
    meters: f64,
}

impl Quantity for Length {
    const KIND: QuantityKind = QuantityKind::Length;
    const UNITS: &'static [UnitSpec] = &[
        UnitSpec::linear("meters", "inMeters", 1.0),
        UnitSpec::linear("kilometers", "inKilometers", 1_000.0),
        UnitSpec::linear("miles", "inMiles", 1_609.344),
        UnitSpec::linear("inches", "inInches", 0.0254),
        UnitSpec::linear("feet", "inFeet", 0.3048),
    ];

    fn from_canonical(value: f64) -> Self {
        Self { meters: value }
    }

    fn canonical(&self) -> f64 {
        self.meters
    }
}

/// Volume, canonical unit liters
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Volume {
    liters: f64,
}

impl Quantity for Volume {
    const KIND: QuantityKind = QuantityKind::Volume;
    const UNITS: &'static [UnitSpec] = &[
        UnitSpec::linear("liters", "inLiters", 1.0),
        UnitSpec::linear("milliliters", "inMilliliters", 0.001),
        UnitSpec::linear("fluidOuncesUs", "inFluidOuncesUs", 0.029_573_529_562_5),
    ];

    fn from_canonical(value: f64) -> Self {
        Self { liters: value }
    }

    fn canonical(&self) -> f64 {
        self.liters
    }
}

/// Energy, canonical unit calories
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Energy {
    calories: f64,
}

impl Quantity for Energy {
    const KIND: QuantityKind = QuantityKind::Energy;
    const UNITS: &'static [UnitSpec] = &[
        UnitSpec::linear("calories", "inCalories", 1.0),
        UnitSpec::linear("kilocalories", "inKilocalories", 1_000.0),
        UnitSpec::linear("joules", "inJoules", 1.0 / 4.184),
        UnitSpec::linear("kilojoules", "inKilojoules", 1_000.0 / 4.184),
    ];

    fn from_canonical(value: f64) -> Self {
        Self { calories: value }
    }

    fn canonical(&self) -> f64 {
        self.calories
    }
}

/// Velocity, canonical unit meters per second (default wire unit km/h)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Velocity {
    meters_per_second: f64,
}

impl Quantity for Velocity {
    const KIND: QuantityKind = QuantityKind::Velocity;
    const UNITS: &'static [UnitSpec] = &[
        UnitSpec::linear("kilometersPerHour", "inKilometersPerHour", 1.0 / 3.6),
        UnitSpec::linear("metersPerSecond", "inMetersPerSecond", 1.0),
        UnitSpec::linear("milesPerHour", "inMilesPerHour", 0.447_04),
    ];

    fn from_canonical(value: f64) -> Self {
        Self {
            meters_per_second: value,
        }
    }

    fn canonical(&self) -> f64 {
        self.meters_per_second
    }
}

/// Power, canonical unit watts (default wire unit kcal/day)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Power {
    watts: f64,
}

impl Quantity for Power {
    const KIND: QuantityKind = QuantityKind::Power;
    const UNITS: &'static [UnitSpec] = &[
        UnitSpec::linear("kilocaloriesPerDay", "inKilocaloriesPerDay", 4_184.0 / 86_400.0),
        UnitSpec::linear("watts", "inWatts", 1.0),
    ];

    fn from_canonical(value: f64) -> Self {
        Self { watts: value }
    }

    fn canonical(&self) -> f64 {
        self.watts
    }
}

/// Blood glucose concentration, canonical unit mmol/L
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct BloodGlucose {
    mmol_per_liter: f64,
}

impl Quantity for BloodGlucose {
    const KIND: QuantityKind = QuantityKind::BloodGlucose;
    const UNITS: &'static [UnitSpec] = &[
        UnitSpec::linear("millimolesPerLiter", "inMillimolesPerLiter", 1.0),
        UnitSpec::linear("milligramsPerDeciliter", "inMilligramsPerDeciliter", 1.0 / 18.0),
    ];

    fn from_canonical(value: f64) -> Self {
        Self {
            mmol_per_liter: value,
        }
    }

    fn canonical(&self) -> f64 {
        self.mmol_per_liter
    }
}
