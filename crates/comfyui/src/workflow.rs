//! Stable Diffusion txt2img workflow in ComfyUI's API format.
//!
//! The graph is the stock txt2img pipeline:
//!
//! | Node | Class                    | Role                     |
//! |------|--------------------------|--------------------------|
//! | `4`  | `CheckpointLoaderSimple` | model, clip and vae      |
//! | `5`  | `EmptyLatentImage`       | output size              |
//! | `6`  | `CLIPTextEncode`         | positive prompt          |
//! | `7`  | `CLIPTextEncode`         | negative prompt          |
//! | `3`  | `KSampler`               | denoising                |
//! | `8`  | `VAEDecode`              | latent to pixels         |
//! | `9`  | `SaveImage`              | writes the output image  |

use serde_json::{json, Value};

/// Node id of the `SaveImage` node.
pub const SAVE_IMAGE_NODE: &str = "9";

/// Default Stable Diffusion checkpoint.
pub const DEFAULT_CHECKPOINT: &str = "analogMadness_v70.safetensors";

/// Sampling parameters for one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub checkpoint: String,
    pub width: u32,
    pub height: u32,
    /// Fixed seed so the same prompt yields the same image.
    pub seed: u64,
    pub steps: u32,
    /// Classifier-free guidance scale.
    pub cfg: f64,
    pub sampler_name: String,
    pub scheduler: String,
    pub filename_prefix: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            checkpoint: DEFAULT_CHECKPOINT.to_string(),
            width: 512,
            height: 512,
            seed: 1,
            steps: 50,
            cfg: 5.0,
            sampler_name: "euler".to_string(),
            scheduler: "normal".to_string(),
            filename_prefix: "imagen".to_string(),
        }
    }
}

impl GenerationParams {
    pub fn with_checkpoint(mut self, checkpoint: impl Into<String>) -> Self {
        self.checkpoint = checkpoint.into();
        self
    }
}

/// Build the txt2img workflow for a positive/negative prompt pair.
pub fn txt2img(params: &GenerationParams, positive: &str, negative: &str) -> Value {
    json!({
        "3": {
            "class_type": "KSampler",
            "inputs": {
                "seed": params.seed,
                "steps": params.steps,
                "cfg": params.cfg,
                "sampler_name": params.sampler_name,
                "scheduler": params.scheduler,
                "denoise": 1.0,
                "model": ["4", 0],
                "positive": ["6", 0],
                "negative": ["7", 0],
                "latent_image": ["5", 0]
            }
        },
        "4": {
            "class_type": "CheckpointLoaderSimple",
            "inputs": { "ckpt_name": params.checkpoint }
        },
        "5": {
            "class_type": "EmptyLatentImage",
            "inputs": {
                "width": params.width,
                "height": params.height,
                "batch_size": 1
            }
        },
        "6": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": positive, "clip": ["4", 1] }
        },
        "7": {
            "class_type": "CLIPTextEncode",
            "inputs": { "text": negative, "clip": ["4", 1] }
        },
        "8": {
            "class_type": "VAEDecode",
            "inputs": { "samples": ["3", 0], "vae": ["4", 2] }
        },
        "9": {
            "class_type": "SaveImage",
            "inputs": { "filename_prefix": params.filename_prefix, "images": ["8", 0] }
        }
    })
}
