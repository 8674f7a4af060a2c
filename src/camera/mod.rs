//! Camera models and the [`Camera`] value that dispatches to them.
//!
//! Every supported lens family is a stateless unit struct implementing
//! [`CameraModel`]. A [`Camera`] stores the model tag, the flat parameter
//! vector and the image resolution, and forwards `project`, `unproject` and
//! `project_with_jac` to the selected model with a single `match`.

use nalgebra::{Matrix2x3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::str::FromStr;

pub mod cameras_txt;
pub mod distortion;
pub mod fov;
pub mod kannala_brandt;
pub mod pinhole;
pub mod rad_tan;
pub mod radial_1d;

pub use fov::FovModel;
pub use kannala_brandt::{OpenCvFisheyeModel, RadialFisheyeModel, SimpleRadialFisheyeModel};
pub use pinhole::{PinholeModel, SimplePinholeModel};
pub use rad_tan::{FullOpenCvModel, OpenCvModel, RadialModel, SimpleRadialModel};
pub use radial_1d::Radial1DModel;

/// Focal lengths and principal point of a camera, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(thiserror::Error, Debug)]
pub enum CameraModelError {
    #[error("Unknown camera model name: {0}")]
    UnknownModelName(String),
    #[error("Unknown camera model id: {0}")]
    UnknownModelId(i32),
    #[error("Camera model {model} expects {expected} parameters, found {found}")]
    ParamCount {
        model: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Camera parameter {0} is not finite")]
    NonFiniteParam(usize),
    #[error("Failed to parse camera record: {0}")]
    Parse(String),
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for CameraModelError {
    fn from(err: std::io::Error) -> Self {
        CameraModelError::IOError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CameraModelError {
    fn from(err: serde_yaml::Error) -> Self {
        CameraModelError::YamlError(err.to_string())
    }
}

/// Trait implemented by every stateless camera model.
///
/// The functions are pure: they read the parameter slice of a [`Camera`] and
/// never fail. Degenerate inputs (points behind the camera, points on the
/// optical axis of a ray-only model, pixels outside the valid field of view)
/// produce best-effort values that may be non-finite.
pub trait CameraModel {
    /// Registry tag of the model.
    const ID: CameraModelId;
    /// Number of entries in the parameter vector.
    const NUM_PARAMS: usize;
    /// Indices of the focal length parameter(s).
    const FOCAL_IDX: &'static [usize];
    /// Indices of the principal point parameters.
    const PRINCIPAL_POINT_IDX: &'static [usize];

    /// Project a 3D point in camera coordinates to pixel coordinates.
    fn project(params: &[f64], point_3d: &Vector3<f64>) -> Vector2<f64>;

    /// Project a 3D point and return the 2x3 Jacobian of the pixel with
    /// respect to the point.
    fn project_with_jac(params: &[f64], point_3d: &Vector3<f64>) -> (Vector2<f64>, Matrix2x3<f64>);

    /// Unproject a pixel to a ray direction in camera coordinates.
    fn unproject(params: &[f64], point_2d: &Vector2<f64>) -> Vector3<f64>;
}

/// The fixed set of camera models with their stable integer ids and names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraModelId {
    #[serde(rename = "SIMPLE_PINHOLE")]
    SimplePinhole,
    #[serde(rename = "PINHOLE")]
    Pinhole,
    #[serde(rename = "SIMPLE_RADIAL")]
    SimpleRadial,
    #[serde(rename = "RADIAL")]
    Radial,
    #[serde(rename = "OPENCV")]
    OpenCv,
    #[serde(rename = "OPENCV_FISHEYE")]
    OpenCvFisheye,
    #[serde(rename = "FULL_OPENCV")]
    FullOpenCv,
    #[serde(rename = "FOV")]
    Fov,
    #[serde(rename = "SIMPLE_RADIAL_FISHEYE")]
    SimpleRadialFisheye,
    #[serde(rename = "RADIAL_FISHEYE")]
    RadialFisheye,
    #[serde(rename = "1D_RADIAL")]
    Radial1D,
}

/// Expands `$body` once per model with `$m` bound to the model type.
macro_rules! with_model {
    ($id:expr, $m:ident => $body:expr) => {
        match $id {
            CameraModelId::SimplePinhole => {
                type $m = SimplePinholeModel;
                $body
            }
            CameraModelId::Pinhole => {
                type $m = PinholeModel;
                $body
            }
            CameraModelId::SimpleRadial => {
                type $m = SimpleRadialModel;
                $body
            }
            CameraModelId::Radial => {
                type $m = RadialModel;
                $body
            }
            CameraModelId::OpenCv => {
                type $m = OpenCvModel;
                $body
            }
            CameraModelId::OpenCvFisheye => {
                type $m = OpenCvFisheyeModel;
                $body
            }
            CameraModelId::FullOpenCv => {
                type $m = FullOpenCvModel;
                $body
            }
            CameraModelId::Fov => {
                type $m = FovModel;
                $body
            }
            CameraModelId::SimpleRadialFisheye => {
                type $m = SimpleRadialFisheyeModel;
                $body
            }
            CameraModelId::RadialFisheye => {
                type $m = RadialFisheyeModel;
                $body
            }
            CameraModelId::Radial1D => {
                type $m = Radial1DModel;
                $body
            }
        }
    };
}

impl CameraModelId {
    /// All registered models, in id order.
    pub const ALL: [CameraModelId; 11] = [
        CameraModelId::SimplePinhole,
        CameraModelId::Pinhole,
        CameraModelId::SimpleRadial,
        CameraModelId::Radial,
        CameraModelId::OpenCv,
        CameraModelId::OpenCvFisheye,
        CameraModelId::FullOpenCv,
        CameraModelId::Fov,
        CameraModelId::SimpleRadialFisheye,
        CameraModelId::RadialFisheye,
        CameraModelId::Radial1D,
    ];

    /// Stable integer id of the model.
    pub fn id(self) -> i32 {
        match self {
            CameraModelId::SimplePinhole => 0,
            CameraModelId::Pinhole => 1,
            CameraModelId::SimpleRadial => 2,
            CameraModelId::Radial => 3,
            CameraModelId::OpenCv => 4,
            CameraModelId::OpenCvFisheye => 5,
            CameraModelId::FullOpenCv => 6,
            CameraModelId::Fov => 7,
            CameraModelId::SimpleRadialFisheye => 8,
            CameraModelId::RadialFisheye => 9,
            CameraModelId::Radial1D => 11,
        }
    }

    /// Registry name of the model, as used in camera text records.
    pub fn name(self) -> &'static str {
        match self {
            CameraModelId::SimplePinhole => "SIMPLE_PINHOLE",
            CameraModelId::Pinhole => "PINHOLE",
            CameraModelId::SimpleRadial => "SIMPLE_RADIAL",
            CameraModelId::Radial => "RADIAL",
            CameraModelId::OpenCv => "OPENCV",
            CameraModelId::OpenCvFisheye => "OPENCV_FISHEYE",
            CameraModelId::FullOpenCv => "FULL_OPENCV",
            CameraModelId::Fov => "FOV",
            CameraModelId::SimpleRadialFisheye => "SIMPLE_RADIAL_FISHEYE",
            CameraModelId::RadialFisheye => "RADIAL_FISHEYE",
            CameraModelId::Radial1D => "1D_RADIAL",
        }
    }

    /// Look up a model by its integer id.
    ///
    /// # Errors
    ///
    /// [`CameraModelError::UnknownModelId`] if `id` is not registered.
    pub fn from_id(id: i32) -> Result<Self, CameraModelError> {
        Self::ALL
            .iter()
            .copied()
            .find(|model| model.id() == id)
            .ok_or(CameraModelError::UnknownModelId(id))
    }

    /// Look up a model by its registry name (case sensitive).
    ///
    /// # Errors
    ///
    /// [`CameraModelError::UnknownModelName`] if `name` is not registered.
    pub fn from_name(name: &str) -> Result<Self, CameraModelError> {
        Self::ALL
            .iter()
            .copied()
            .find(|model| model.name() == name)
            .ok_or_else(|| CameraModelError::UnknownModelName(name.to_string()))
    }

    /// Length of the parameter vector of this model.
    pub fn num_params(self) -> usize {
        with_model!(self, M => M::NUM_PARAMS)
    }

    /// Parameter indices holding the focal length(s). Empty for
    /// `1D_RADIAL`, one entry for single-focal models, `[fx, fy]` otherwise.
    pub fn focal_idx(self) -> &'static [usize] {
        with_model!(self, M => M::FOCAL_IDX)
    }

    /// Parameter indices of `cx` and `cy`.
    pub fn principal_point_idx(self) -> &'static [usize] {
        with_model!(self, M => M::PRINCIPAL_POINT_IDX)
    }
}

impl fmt::Display for CameraModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CameraModelId {
    type Err = CameraModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// A calibrated camera: model tag, parameter vector and image size.
///
/// The parameter vector always has exactly
/// [`CameraModelId::num_params`] entries for its model. Fields are private so
/// the invariant can only be established by the constructors and by
/// [`Camera::initialize_from_txt`].
///
/// # Examples
///
/// ```rust
/// use camera_refine::camera::Camera;
/// use nalgebra::Vector3;
///
/// let params = vec![2000.0, 1234.0, 4567.0, -0.1234];
/// let camera = Camera::new("SIMPLE_RADIAL", params, 987, 123).unwrap();
/// assert_eq!(camera.model_id(), 2);
///
/// let xp = camera.project(&Vector3::new(0.1, -0.2, 1.0));
/// let ray = camera.unproject(&xp);
/// assert!((ray - Vector3::new(0.1, -0.2, 1.0)).norm() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CameraFields")]
pub struct Camera {
    model: CameraModelId,
    params: Vec<f64>,
    resolution: Resolution,
}

/// Unchecked field set that deserialized cameras pass through.
#[derive(Deserialize)]
struct CameraFields {
    model: CameraModelId,
    params: Vec<f64>,
    resolution: Resolution,
}

impl TryFrom<CameraFields> for Camera {
    type Error = CameraModelError;

    fn try_from(fields: CameraFields) -> Result<Self, Self::Error> {
        let Resolution { width, height } = fields.resolution;
        Camera::from_model(fields.model, fields.params, width, height)
    }
}

impl Default for Camera {
    fn default() -> Self {
        Camera {
            model: CameraModelId::SimplePinhole,
            params: vec![1.0, 0.0, 0.0],
            resolution: Resolution::default(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CameraDocument {
    cam0: Camera,
}

impl Camera {
    /// Creates a camera from a registry name, parameters and image size.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::UnknownModelName`] if `model_name` is not registered.
    /// * [`CameraModelError::ParamCount`] if `params` has the wrong length.
    /// * [`CameraModelError::NonFiniteParam`] if a parameter is NaN or infinite.
    pub fn new(
        model_name: &str,
        params: Vec<f64>,
        width: u32,
        height: u32,
    ) -> Result<Self, CameraModelError> {
        Self::from_model(CameraModelId::from_name(model_name)?, params, width, height)
    }

    /// Creates a camera from a model tag, parameters and image size.
    pub fn from_model(
        model: CameraModelId,
        params: Vec<f64>,
        width: u32,
        height: u32,
    ) -> Result<Self, CameraModelError> {
        let camera = Camera {
            model,
            params,
            resolution: Resolution { width, height },
        };
        camera.validate_params()?;
        Ok(camera)
    }

    /// Resolves a registry name to its integer id.
    pub fn id_from_string(name: &str) -> Result<i32, CameraModelError> {
        CameraModelId::from_name(name).map(CameraModelId::id)
    }

    /// Resolves an integer id to its registry name.
    pub fn name_from_id(id: i32) -> Result<&'static str, CameraModelError> {
        CameraModelId::from_id(id).map(CameraModelId::name)
    }

    pub fn model(&self) -> CameraModelId {
        self.model
    }

    /// Integer registry id, see [`CameraModelId::id`].
    pub fn model_id(&self) -> i32 {
        self.model.id()
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    /// Checks the parameter count against the model and that every
    /// parameter is finite.
    pub fn validate_params(&self) -> Result<(), CameraModelError> {
        let expected = self.model.num_params();
        if self.params.len() != expected {
            return Err(CameraModelError::ParamCount {
                model: self.model.name(),
                expected,
                found: self.params.len(),
            });
        }
        if let Some(idx) = self.params.iter().position(|p| !p.is_finite()) {
            return Err(CameraModelError::NonFiniteParam(idx));
        }
        Ok(())
    }

    /// Projects a 3D point in camera coordinates to pixel coordinates.
    ///
    /// Points behind the camera are not rejected; callers filter them
    /// upstream. The result may be non-finite for degenerate inputs.
    pub fn project(&self, point_3d: &Vector3<f64>) -> Vector2<f64> {
        with_model!(self.model, M => M::project(&self.params, point_3d))
    }

    /// Projects a 3D point and returns the analytic 2x3 Jacobian
    /// `d(pixel)/d(point)` alongside the pixel. The pixel is identical to
    /// [`Camera::project`].
    pub fn project_with_jac(&self, point_3d: &Vector3<f64>) -> (Vector2<f64>, Matrix2x3<f64>) {
        with_model!(self.model, M => M::project_with_jac(&self.params, point_3d))
    }

    /// Unprojects a pixel to a ray direction.
    ///
    /// The ray has `z = 1` for every model except `1D_RADIAL`, which returns
    /// a unit vector in the image plane.
    pub fn unproject(&self, point_2d: &Vector2<f64>) -> Vector3<f64> {
        with_model!(self.model, M => M::unproject(&self.params, point_2d))
    }

    /// Projects every point of `points_3d` with [`Camera::project`].
    ///
    /// # Arguments
    ///
    /// * `points_3d` - Points in camera coordinates.
    ///
    /// # Returns
    ///
    /// One pixel per input point, in the same order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use camera_refine::camera::Camera;
    /// use nalgebra::{Vector2, Vector3};
    ///
    /// let camera = Camera::new("SIMPLE_PINHOLE", vec![100.0, 50.0, 40.0], 100, 80).unwrap();
    /// let points = [Vector3::new(0.0, 0.0, 1.0), Vector3::new(0.5, 0.25, 2.0)];
    /// let pixels = camera.project_points(&points);
    /// assert_eq!(pixels, vec![Vector2::new(50.0, 40.0), Vector2::new(75.0, 52.5)]);
    /// ```
    pub fn project_points(&self, points_3d: &[Vector3<f64>]) -> Vec<Vector2<f64>> {
        points_3d.iter().map(|x| self.project(x)).collect()
    }

    /// Unprojects every pixel of `points_2d` with [`Camera::unproject`].
    pub fn unproject_points(&self, points_2d: &[Vector2<f64>]) -> Vec<Vector3<f64>> {
        points_2d.iter().map(|xp| self.unproject(xp)).collect()
    }

    /// Mean focal length. Models without a focal length return `1.0`.
    pub fn focal(&self) -> f64 {
        let idx = self.model.focal_idx();
        if idx.is_empty() {
            return 1.0;
        }
        idx.iter().map(|&i| self.params[i]).sum::<f64>() / idx.len() as f64
    }

    /// Horizontal focal length. Single-focal models return their only
    /// focal length and `1D_RADIAL` returns `1.0`.
    pub fn focal_x(&self) -> f64 {
        match self.model.focal_idx().first() {
            Some(&i) => self.params[i],
            None => 1.0,
        }
    }

    /// Vertical focal length, with the same fallbacks as [`Camera::focal_x`].
    pub fn focal_y(&self) -> f64 {
        match self.model.focal_idx().last() {
            Some(&i) => self.params[i],
            None => 1.0,
        }
    }

    /// Principal point `(cx, cy)` in pixels.
    pub fn principal_point(&self) -> Vector2<f64> {
        let idx = self.model.principal_point_idx();
        Vector2::new(self.params[idx[0]], self.params[idx[1]])
    }

    /// Returns the camera for an image resized by `scale`.
    ///
    /// Focal lengths and the principal point are multiplied by `scale`;
    /// distortion coefficients are left unchanged.
    pub fn scaled(&self, scale: f64) -> Camera {
        let mut params = self.params.clone();
        for &i in self
            .model
            .focal_idx()
            .iter()
            .chain(self.model.principal_point_idx())
        {
            params[i] *= scale;
        }
        Camera {
            model: self.model,
            params,
            resolution: Resolution {
                width: (self.resolution.width as f64 * scale).round() as u32,
                height: (self.resolution.height as f64 * scale).round() as u32,
            },
        }
    }

    /// Loads a camera from a YAML file with a top-level `cam0` entry.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::IOError`] if the file cannot be read.
    /// * [`CameraModelError::YamlError`] if the document is malformed, the
    ///   model name is not registered or the parameters fail
    ///   [`Camera::validate_params`].
    pub fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        let doc: CameraDocument = serde_yaml::from_str(&contents)?;
        Ok(doc.cam0)
    }

    /// Saves the camera to a YAML file under a top-level `cam0` entry.
    pub fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        let yaml_string = serde_yaml::to_string(&CameraDocument { cam0: self.clone() })?;
        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;
        Ok(())
    }
}
