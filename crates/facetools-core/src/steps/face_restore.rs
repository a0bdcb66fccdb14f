//! FaceRestoreCF: restore faces with a CodeFormer/GFPGAN model.

use super::{detection_models, restore_model_id};
use crate::error::Result;
use crate::features::Feature;
use crate::graph::{BuildContext, NodeInputs, NodeRef, Step, StepOutcome};
use crate::params::{ParamDef, ParameterStore, ParamsExt, ParamsPruneExt};

pub const STEP_NAME: &str = "FaceRestoreCF";
pub const PRIORITY: f64 = 9.0;

pub const FIDELITY: ParamDef = ParamDef::number("[FR] Fidelity", 0.5, 0.01);
pub const FACE_RESTORE_MODEL: ParamDef =
    ParamDef::text("[FR] Face Restore Model", "codeformer-v0.1.0.pth").ignore_if("None");
pub const FACE_DETECTION_MODEL: ParamDef =
    ParamDef::text("[FR] Face Detection Model", "retinaface_resnet50");

pub const FACE_DETECTION_MODELS: &[&str] = &[
    "retinaface_resnet50",
    "retinaface_mobile0.25",
    "YOLOv5l",
    "YOLOv5n",
];

pub fn step() -> Step {
    Step::new(STEP_NAME, PRIORITY, apply)
        .with_feature(Feature::FaceRestoration)
        .with_required_models(required_models)
}

fn apply(ctx: &mut BuildContext<'_>) -> Result<StepOutcome> {
    let Some(model) = ctx.params().get_text(&FACE_RESTORE_MODEL)? else {
        return Ok(StepOutcome::Skipped);
    };
    ctx.require_feature(STEP_NAME, &Feature::FaceRestoration)?;

    let detection = ctx.params_mut().take_text(&FACE_DETECTION_MODEL)?;
    let fidelity = ctx.params_mut().take_number(&FIDELITY)?;

    let loader = ctx.create_node(
        "FaceRestoreModelLoader",
        NodeInputs::new().value("model_name", model),
    );
    let image = ctx.current_output().clone();
    let restore = ctx.create_node(
        "FaceRestoreCFWithModel",
        NodeInputs::new()
            .link("facerestore_model", NodeRef::new(loader, 0))
            .link("image", image)
            .value("facedetection", detection)
            .value("codeformer_fidelity", fidelity),
    );
    ctx.set_current_output(NodeRef::new(restore, 0));
    Ok(StepOutcome::Applied)
}

fn required_models(params: &dyn ParameterStore) -> Result<Vec<String>> {
    let Some(model) = params.get_text(&FACE_RESTORE_MODEL)? else {
        return Ok(Vec::new());
    };
    let detection = params.text_or_default(&FACE_DETECTION_MODEL)?;

    let mut models = vec![restore_model_id(&model)];
    models.extend(detection_models(&detection));
    Ok(models)
}
