pub mod controller;
pub mod device;
#[cfg(feature = "native-camera")]
pub mod native_camera;
pub mod surfaces;
pub mod virtual_camera;

pub use controller::{CaptureController, CaptureState, ViewerAttachment, ViewerError};
#[cfg(feature = "native-camera")]
pub use native_camera::NativeCamera;
pub use device::{CameraDevice, DeviceError, StreamConstraints, StreamHandle, VideoStream};
pub use surfaces::{DecodeTarget, FrameSample, SamplingSurface};
pub use virtual_camera::{VirtualCamera, VirtualCameraMode};
