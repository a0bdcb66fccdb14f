//! Built-in graph steps.

pub mod face_restore;
pub mod reactor;

use crate::error::Result;
use crate::graph::StepRegistry;

/// Value model dropdowns use for "no model".
pub const NONE: &str = "none";

/// Register every built-in step.
pub fn register_builtin_steps(registry: &mut StepRegistry) -> Result<()> {
    registry.register(face_restore::step())?;
    registry.register(reactor::step())?;
    Ok(())
}

/// A registry pre-filled with the built-in steps.
pub fn builtin_registry() -> Result<StepRegistry> {
    let mut registry = StepRegistry::new();
    register_builtin_steps(&mut registry)?;
    Ok(registry)
}

pub(crate) fn restore_model_id(model: &str) -> String {
    format!("models/facerestore_models/{}", model)
}

/// Weights facexlib loads for a face detection choice, plus the parsing model
/// used to paste restored faces back.
pub(crate) fn detection_models(detection: &str) -> Vec<String> {
    let detector = match detection {
        "retinaface_resnet50" => Some("detection_Resnet50_Final.pth"),
        "retinaface_mobile0.25" => Some("detection_mobilenet0.25_Final.pth"),
        "YOLOv5l" => Some("yolov5l-face.pth"),
        "YOLOv5n" => Some("yolov5n-face.pth"),
        _ => None,
    };
    detector
        .into_iter()
        .chain(std::iter::once("parsing_parsenet.pth"))
        .map(|file| format!("models/facedetection/{}", file))
        .collect()
}
