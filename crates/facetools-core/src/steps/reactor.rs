//! ReActor: face swap from an image or saved face model, or restore only.
//!
//! Branches, in order:
//! - a face image or face model is given: swap (`ReActorFaceSwapOpt`), with
//!   the image taking priority over the model;
//! - otherwise a restore model other than `none` is given: `ReActorRestoreFace`;
//! - otherwise nothing is emitted.
//!
//! An optional second restore runs on the result, and an optional YOLO face
//! mask blends it back so only the face region changes.

use super::{detection_models, restore_model_id, NONE};
use crate::error::Result;
use crate::features::Feature;
use crate::graph::{BuildContext, NodeInputs, NodeRef, Step, StepOutcome};
use crate::params::{ParamDef, ParameterStore, ParamsExt, ParamsPruneExt};
use serde_json::json;

pub const STEP_NAME: &str = "ReActor";
pub const PRIORITY: f64 = 9.1;

pub const FACE_IMAGE: ParamDef = ParamDef::required("[ReActor] Face Image");
pub const FACE_MODEL: ParamDef = ParamDef::text("[ReActor] Face Model", NONE).ignore_if(NONE);
pub const FACE_RESTORE_VISIBILITY: ParamDef =
    ParamDef::number("[ReActor] Face Restore Visibility", 1.0, 0.01);
pub const FACE_RESTORE_MODEL: ParamDef =
    ParamDef::text("[ReActor] Face Restore Model", "codeformer-v0.1.0.pth");
pub const CODEFORMER_WEIGHT: ParamDef = ParamDef::number("[ReActor] CodeFormer Weight", 0.5, 0.01);
pub const SECOND_FACE_RESTORE_MODEL: ParamDef =
    ParamDef::text("[ReActor] Second Face Restore Model", "GPEN-BFR-1024.onnx").ignore_if(NONE);
pub const FACE_MASK_MODEL: ParamDef =
    ParamDef::text("[ReActor] Face Mask Model", "face_yolov8m-seg_60.pt").ignore_if(NONE);
pub const FACE_BOOST: ParamDef = ParamDef::boolean("[ReActor] Face Boost", false);
pub const FACE_BOOST_RESTORE_AFTER_MAIN: ParamDef =
    ParamDef::boolean("[ReActor] Face Boost Restore After Main", false);
pub const INPUT_FACES_ORDER: ParamDef = ParamDef::text("[ReActor] Input Faces Order", "large-small");
pub const INPUT_FACES_INDEX: ParamDef = ParamDef::text("[ReActor] Input Faces Index", "0");
pub const INPUT_GENDER_DETECT: ParamDef = ParamDef::text("[ReActor] Input Gender Detect", "no");
pub const SOURCE_FACES_ORDER: ParamDef =
    ParamDef::text("[ReActor] Source Faces Order", "large-small");
pub const SOURCE_FACES_INDEX: ParamDef = ParamDef::text("[ReActor] Source Faces Index", "0");
pub const SOURCE_GENDER_DETECT: ParamDef = ParamDef::text("[ReActor] Source Gender Detect", "no");
pub const FACE_DETECTION_MODEL: ParamDef =
    ParamDef::text("[ReActor] Face Detection Model", "retinaface_resnet50");
pub const FACE_SWAP_MODEL: ParamDef =
    ParamDef::text("[ReActor] Face Swap Model", "inswapper_128.onnx").ignore_if(NONE);

pub const GENDER_DETECT_OPTIONS: &[&str] = &["no", "female", "male"];
pub const FACES_ORDER_OPTIONS: &[&str] = &[
    "left-right",
    "right-left",
    "top-bottom",
    "bottom-top",
    "small-large",
    "large-small",
];

/// Models insightface loads for face analysis before any swap.
const FACE_ANALYSIS_MODELS: &[&str] = &[
    "models/insightface/models/buffalo_l/det_10g.onnx",
    "models/insightface/models/buffalo_l/w600k_r50.onnx",
];

pub fn step() -> Step {
    Step::new(STEP_NAME, PRIORITY, apply)
        .with_feature(Feature::Reactor)
        .with_required_models(required_models)
}

/// Where the swapped face comes from.
enum FaceSource {
    Image(String),
    Model(String),
}

fn face_source(params: &dyn ParameterStore) -> Result<Option<FaceSource>> {
    if let Some(image) = params.get_text(&FACE_IMAGE)? {
        return Ok(Some(FaceSource::Image(image)));
    }
    Ok(params.get_text(&FACE_MODEL)?.map(FaceSource::Model))
}

fn apply(ctx: &mut BuildContext<'_>) -> Result<StepOutcome> {
    let restore_model = ctx.params().get_text(&FACE_RESTORE_MODEL)?;
    let source = face_source(ctx.params())?;
    if restore_model.is_none() && source.is_none() {
        return Ok(StepOutcome::Skipped);
    }
    ctx.require_feature(STEP_NAME, &Feature::Reactor)?;

    let restores = restore_model.as_deref().is_some_and(|model| model != NONE);
    if source.is_none() && !restores {
        return Ok(StepOutcome::Skipped);
    }
    let mask_model = ctx.params().get_text(&FACE_MASK_MODEL)?;
    if mask_model.is_some() {
        ctx.require_feature(STEP_NAME, &Feature::Yolov8)?;
    }

    let visibility = ctx.params_mut().take_number(&FACE_RESTORE_VISIBILITY)?;
    let codeformer_weight = ctx.params_mut().take_number(&CODEFORMER_WEIGHT)?;
    let detection = ctx.params_mut().take_text(&FACE_DETECTION_MODEL)?;
    let input_image = ctx.current_output().clone();

    let mut output = match source {
        Some(source) => swap_face(
            ctx,
            source,
            restore_model.as_deref().unwrap_or(NONE),
            visibility,
            codeformer_weight,
            &detection,
        )?,
        None => {
            let model = restore_model.as_deref().unwrap_or(NONE);
            restore_face(ctx, input_image.clone(), model, visibility, codeformer_weight, &detection)
        }
    };

    if let Some(second) = ctx.params().get_text(&SECOND_FACE_RESTORE_MODEL)? {
        output = restore_face(ctx, output, &second, visibility, codeformer_weight, &detection);
    }

    if let Some(mask_model) = mask_model {
        output = mask_face(ctx, input_image, output, &mask_model);
    }

    ctx.set_current_output(output);
    Ok(StepOutcome::Applied)
}

fn swap_face(
    ctx: &mut BuildContext<'_>,
    source: FaceSource,
    restore_model: &str,
    visibility: f64,
    codeformer_weight: f64,
    detection: &str,
) -> Result<NodeRef> {
    let (source_image, face_model) = match source {
        FaceSource::Image(image) => (Some(ctx.create_load_image_node(&image)), None),
        FaceSource::Model(model) => {
            let id = ctx.create_node(
                "ReActorLoadFaceModel",
                NodeInputs::new().value("face_model", model),
            );
            (None, Some(NodeRef::new(id, 0)))
        }
    };

    let boost = ctx.params().get_bool(&FACE_BOOST)?;
    let restore_after_main = ctx.params().get_bool(&FACE_BOOST_RESTORE_AFTER_MAIN)?;
    let face_boost = match (boost, restore_after_main) {
        (Some(true), Some(restore_after_main)) => {
            let id = ctx.create_node(
                "ReActorFaceBoost",
                NodeInputs::new()
                    .value("enabled", true)
                    .value("boost_model", restore_model)
                    .value("interpolation", "Bicubic")
                    .value("visibility", visibility)
                    .value("codeformer_weight", codeformer_weight)
                    .value("restore_with_main_after", restore_after_main),
            );
            Some(NodeRef::new(id, 0))
        }
        _ => None,
    };

    let params = ctx.params_mut();
    let options_inputs = NodeInputs::new()
        .value("input_faces_order", params.take_text(&INPUT_FACES_ORDER)?)
        .value("input_faces_index", params.take_text(&INPUT_FACES_INDEX)?)
        .value("detect_gender_input", params.take_text(&INPUT_GENDER_DETECT)?)
        .value("source_faces_order", params.take_text(&SOURCE_FACES_ORDER)?)
        .value("source_faces_index", params.take_text(&SOURCE_FACES_INDEX)?)
        .value("detect_gender_source", params.take_text(&SOURCE_GENDER_DETECT)?)
        .value("console_log_level", 1);
    let swap_model = params.take_text(&FACE_SWAP_MODEL)?;
    let options = ctx.create_node("ReActorOptions", options_inputs);

    let input_image = ctx.current_output().clone();
    let swap = ctx.create_node(
        "ReActorFaceSwapOpt",
        NodeInputs::new()
            .link("input_image", input_image)
            .link("options", NodeRef::new(options, 0))
            .link_opt("source_image", source_image)
            .link_opt("face_model", face_model)
            .link_opt("face_boost", face_boost)
            .value("enabled", true)
            .value("swap_model", swap_model)
            .value("facedetection", detection)
            .value("face_restore_model", restore_model)
            .value("face_restore_visibility", visibility)
            .value("codeformer_weight", codeformer_weight),
    );
    Ok(NodeRef::new(swap, 0))
}

fn restore_face(
    ctx: &mut BuildContext<'_>,
    image: NodeRef,
    model: &str,
    visibility: f64,
    codeformer_weight: f64,
    detection: &str,
) -> NodeRef {
    let id = ctx.create_node(
        "ReActorRestoreFace",
        NodeInputs::new()
            .link("image", image)
            .value("facedetection", detection)
            .value("model", model)
            .value("visibility", visibility)
            .value("codeformer_weight", codeformer_weight),
    );
    NodeRef::new(id, 0)
}

/// Blend `swapped` into `original` inside a detected face mask.
fn mask_face(ctx: &mut BuildContext<'_>, original: NodeRef, swapped: NodeRef, model: &str) -> NodeRef {
    let detector = ctx.create_node(
        "SwarmYoloDetection",
        NodeInputs::new()
            .link("image", original.clone())
            .value("model_name", model)
            .value("index", 0),
    );
    let helper = ctx.create_node(
        "ReActorMaskHelper",
        NodeInputs::new()
            .link("image", original)
            .link("swapped_image", swapped)
            .value("bbox_model_name", "")
            .value("bbox_threshold", 0.5)
            .value("bbox_dilation", 10)
            .value("bbox_crop_factor", 3)
            .value("bbox_drop_size", 10)
            .value("sam_model_name", "")
            .value("sam_dilation", 0)
            .value("sam_threshold", 0.93)
            .value("bbox_expansion", 0)
            .value("mask_hint_threshold", 0.7)
            .value("mask_hint_use_negative", json!("False"))
            .value("morphology_operation", "dilate")
            .value("morphology_distance", 0)
            .value("blur_radius", 9)
            .value("sigma_factor", 1)
            .link("mask_optional", NodeRef::new(detector, 0)),
    );
    NodeRef::new(helper, 0)
}

fn required_models(params: &dyn ParameterStore) -> Result<Vec<String>> {
    let restore_model = params.get_text(&FACE_RESTORE_MODEL)?;
    let swapping = face_source(params)?.is_some();
    let restoring = restore_model.as_deref().is_some_and(|m| m != NONE);
    if !swapping && !restoring {
        return Ok(Vec::new());
    }

    let mut models = Vec::new();
    if swapping {
        let swap_model = params.text_or_default(&FACE_SWAP_MODEL)?;
        models.push(format!("models/insightface/{}", swap_model));
        models.extend(FACE_ANALYSIS_MODELS.iter().map(|m| m.to_string()));
    }
    if let Some(model) = restore_model.filter(|m| m != NONE) {
        models.push(restore_model_id(&model));
    }
    if let Some(second) = params.get_text(&SECOND_FACE_RESTORE_MODEL)? {
        models.push(restore_model_id(&second));
    }
    models.extend(detection_models(&params.text_or_default(&FACE_DETECTION_MODEL)?));
    Ok(models)
}
