//! Point names exchanged with the simulation engine.

/// Base heating setpoint output; also the heating input point.
pub const HEATING_SETPOINT: &str = "Heating Setpoint";
/// Base cooling setpoint output; also the cooling input point.
pub const COOLING_SETPOINT: &str = "Cooling Setpoint";
pub const OUTDOOR_AIR_DRYBULB_TEMPERATURE: &str = "Outdoor Air Drybulb Temperature";
pub const HEATING_COIL_RUNTIME_FRACTION: &str = "Heating Coil Runtime Fraction";
pub const COOLING_COIL_RUNTIME_FRACTION: &str = "Cooling Coil Runtime Fraction";
pub const SUPPLY_FAN_AIR_MASS_FLOW_RATE: &str = "Fan Air Mass Flow Rate";
pub const SYSTEM_NODE_TEMPERATURE: &str = "System Node Temperature";
pub const SYSTEM_NODE_VOLUME_FLOW_RATE: &str = "System Node Current Density Volume Flow Rate";

/// Energy meters echoed into the record.
pub const ENERGY_METERS: [&str; 4] = [
    "Cooling Coil Electricity Energy",
    "Fan Electricity Energy",
    "Heating Coil FuelOilNo2 Energy",
    "Heating Coil Electricity Energy",
];

pub fn zone_air_temperature(zone: &str) -> String {
    format!("{zone} Air Temperature")
}

pub fn zone_humidity(zone: &str) -> String {
    format!("{zone} Humidity")
}

pub fn zone_temperature_setpoint(zone: &str) -> String {
    format!("{zone} Temperature Setpoint")
}
