//! One-line text records for cameras.
//!
//! A record is whitespace separated:
//!
//! ```text
//! [<camera id>] <MODEL_NAME> <width> <height> <param0> ... <paramK-1>
//! ```
//!
//! The leading id is optional. It is reported back to the caller but plays
//! no part in resolving the model. Numbers are written with the shortest
//! representation that parses back to the same `f64`, so parsing and
//! re-serializing a record reproduces it exactly.

use crate::camera::{Camera, CameraModelError, CameraModelId, Resolution};
use std::fmt;
use std::str::FromStr;

fn parse_number<T: FromStr>(token: &str, field: &str) -> Result<T, CameraModelError> {
    token
        .parse()
        .map_err(|_| CameraModelError::Parse(format!("invalid {}: '{}'", field, token)))
}

fn parse_record(line: &str) -> Result<(Camera, Option<u32>), CameraModelError> {
    let mut tokens = line.split_whitespace().peekable();

    let camera_id = match tokens.peek() {
        Some(token) => token.parse::<u32>().ok(),
        None => return Err(CameraModelError::Parse("empty camera record".to_string())),
    };
    if camera_id.is_some() {
        tokens.next();
    }

    let name = tokens
        .next()
        .ok_or_else(|| CameraModelError::Parse("missing model name".to_string()))?;
    let model = CameraModelId::from_name(name)?;

    let width = tokens
        .next()
        .ok_or_else(|| CameraModelError::Parse("missing width".to_string()))
        .and_then(|t| parse_number::<u32>(t, "width"))?;
    let height = tokens
        .next()
        .ok_or_else(|| CameraModelError::Parse("missing height".to_string()))
        .and_then(|t| parse_number::<u32>(t, "height"))?;

    let params = tokens
        .map(|t| parse_number::<f64>(t, "parameter"))
        .collect::<Result<Vec<_>, _>>()?;

    let camera = Camera::from_model(model, params, width, height)?;
    Ok((camera, camera_id))
}

impl Camera {
    /// Parses a camera record, e.g.
    /// `"0 SIMPLE_RADIAL 1936 1296 2425.85 932.383 628.265 -0.0397695"`.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::UnknownModelName`] for an unregistered model.
    /// * [`CameraModelError::Parse`] for missing fields or bad numbers.
    /// * [`CameraModelError::ParamCount`] if the number of parameters does
    ///   not match the model.
    pub fn from_cameras_txt(line: &str) -> Result<(Camera, Option<u32>), CameraModelError> {
        parse_record(line)
    }

    /// Re-initializes this camera from a record and returns its leading
    /// camera id, if any. On error the camera is left unchanged.
    pub fn initialize_from_txt(&mut self, line: &str) -> Result<Option<u32>, CameraModelError> {
        let (camera, camera_id) = parse_record(line)?;
        *self = camera;
        Ok(camera_id)
    }

    /// Renders the camera as a record, prefixed by `camera_id` when given.
    pub fn to_cameras_txt(&self, camera_id: Option<u32>) -> String {
        let Resolution { width, height } = self.resolution;
        let mut fields = Vec::with_capacity(self.params.len() + 4);
        if let Some(id) = camera_id {
            fields.push(id.to_string());
        }
        fields.push(self.model.name().to_string());
        fields.push(width.to_string());
        fields.push(height.to_string());
        fields.extend(self.params.iter().map(|p| p.to_string()));
        fields.join(" ")
    }
}

impl FromStr for Camera {
    type Err = CameraModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_record(s).map(|(camera, _)| camera)
    }
}

impl fmt::Display for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cameras_txt(None))
    }
}
