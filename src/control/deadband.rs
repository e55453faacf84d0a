//! Deadband hysteresis controller.

use crate::error::ControlError;

/// Band-edge tolerance that keeps the controller from chattering when the
/// zone temperature sits exactly on a deadband boundary.
pub const DEADBAND_TOLERANCE: f64 = 0.005;

/// Which side of the HVAC system a setpoint request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvacMode {
    Heating,
    Cooling,
}

/// Requested setpoint and asymmetric deadband for one side of the system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointRequest {
    /// Nominal setpoint the band is centred on.
    pub new_value: f64,
    /// Band width above `new_value`.
    pub deadband_up: f64,
    /// Band width below `new_value`.
    pub deadband_down: f64,
}

impl SetpointRequest {
    /// Creates a request from already-numeric values.
    pub fn new(new_value: f64, deadband_up: f64, deadband_down: f64) -> Self {
        Self {
            new_value,
            deadband_up,
            deadband_down,
        }
    }

    /// Parses a request from raw text fields, as they arrive from a form or
    /// a schedule cell.
    ///
    /// Returns `Ok(None)` when `new_value` is blank or not numeric: the side is
    /// simply not being requested.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidInput`] if `new_value` is numeric but
    /// either deadband is not.
    pub fn parse(
        new_value: &str,
        deadband_up: &str,
        deadband_down: &str,
    ) -> Result<Option<Self>, ControlError> {
        let Some(new_value) = parse_real(new_value) else {
            return Ok(None);
        };
        let up = parse_real(deadband_up).ok_or_else(|| {
            ControlError::InvalidInput(format!("deadband up \"{deadband_up}\" is not a number"))
        })?;
        let down = parse_real(deadband_down).ok_or_else(|| {
            ControlError::InvalidInput(format!(
                "deadband down \"{deadband_down}\" is not a number"
            ))
        })?;
        Ok(Some(Self::new(new_value, up, down)))
    }

    /// Lower band edge: `new_value - deadband_down`.
    pub fn lower_edge(&self) -> f64 {
        self.new_value - self.deadband_down
    }

    /// Upper band edge: `new_value + deadband_up`.
    pub fn upper_edge(&self) -> f64 {
        self.new_value + self.deadband_up
    }

    fn validate(&self) -> Result<(), ControlError> {
        for (name, value) in [
            ("new setpoint", self.new_value),
            ("deadband up", self.deadband_up),
            ("deadband down", self.deadband_down),
        ] {
            if !value.is_finite() {
                return Err(ControlError::InvalidInput(format!(
                    "{name} must be a finite number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

fn parse_real(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Computes the next base setpoint for one side of the system.
///
/// Heating engages (`upper_edge`) once the zone falls to the lower band edge
/// and coasts (`lower_edge`) once it reaches the upper edge. Cooling is the
/// mirror image. Between the edges `current_setpoint` is held, so the output
/// sticks at whichever edge was crossed last.
///
/// # Errors
///
/// Returns [`ControlError::InvalidInput`] if `zone_temperature` is absent or
/// any input is not a finite number.
///
/// # Examples
///
/// ```
/// use hvac_cosim::control::deadband::{HvacMode, SetpointRequest, apply_deadband};
///
/// let request = SetpointRequest::new(20.0, 1.5, 1.5);
/// // Cold zone: heat towards the top of the band.
/// let sp = apply_deadband(HvacMode::Heating, Some(18.0), 20.0, &request).ok();
/// assert_eq!(sp, Some(21.5));
/// ```
pub fn apply_deadband(
    mode: HvacMode,
    zone_temperature: Option<f64>,
    current_setpoint: f64,
    request: &SetpointRequest,
) -> Result<f64, ControlError> {
    let zone = zone_temperature
        .filter(|t| t.is_finite())
        .ok_or_else(|| {
            ControlError::InvalidInput("zone temperature is missing or not a number".into())
        })?;
    if !current_setpoint.is_finite() {
        return Err(ControlError::InvalidInput(format!(
            "current setpoint must be a finite number, got {current_setpoint}"
        )));
    }
    request.validate()?;

    let at_or_below_lower = zone <= request.lower_edge() + DEADBAND_TOLERANCE;
    let at_or_above_upper = zone >= request.upper_edge() - DEADBAND_TOLERANCE;

    let next = match mode {
        HvacMode::Heating => {
            if at_or_below_lower {
                request.upper_edge()
            } else if at_or_above_upper {
                request.lower_edge()
            } else {
                current_setpoint
            }
        }
        HvacMode::Cooling => {
            if at_or_above_upper {
                request.lower_edge()
            } else if at_or_below_lower {
                request.upper_edge()
            } else {
                current_setpoint
            }
        }
    };
    Ok(next)
}
