//! Antialiasing mode selection and the final spatial pass

use serde::{Deserialize, Serialize};

use crate::render::context::RenderContext;
use crate::render::command::SurfaceRef;
use crate::render::surface_pool::SurfaceHandle;
use crate::render::upscale::UpscalerKind;
use crate::render::upscale::jitter::halton;

/// Antialiasing / upscaling mode selected for a view
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Antialiasing {
    #[default]
    None,
    Fxaa,
    Smaa,
    Taa,
    Fsr1,
    Fsr3,
    Dlss,
    Xess,
}

impl Antialiasing {
    /// Backend that drives this mode, if any
    pub fn upscaler_kind(self) -> Option<UpscalerKind> {
        match self {
            Self::None | Self::Fxaa | Self::Smaa => None,
            Self::Taa => Some(UpscalerKind::Taa),
            Self::Fsr1 => Some(UpscalerKind::Fsr1),
            Self::Fsr3 => Some(UpscalerKind::Fsr3),
            Self::Dlss => Some(UpscalerKind::Dlss),
            Self::Xess => Some(UpscalerKind::Xess),
        }
    }

    /// Runs as a spatial filter in the final pass
    pub fn is_final_pass_filter(self) -> bool {
        matches!(self, Self::Fxaa | Self::Smaa)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Fxaa => "FXAA",
            Self::Smaa => "SMAA",
            Self::Taa => "TAA",
            Self::Fsr1 => "FSR 1",
            Self::Fsr3 => "FSR 3",
            Self::Dlss => "DLSS",
            Self::Xess => "XeSS",
        }
    }
}

/// Mode substituted when the selected upscaler is unsupported
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackMode {
    None,
    Fxaa,
    Smaa,
    #[default]
    Taa,
}

impl From<FallbackMode> for Antialiasing {
    fn from(mode: FallbackMode) -> Self {
        match mode {
            FallbackMode::None => Self::None,
            FallbackMode::Fxaa => Self::Fxaa,
            FallbackMode::Smaa => Self::Smaa,
            FallbackMode::Taa => Self::Taa,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FxaaSettings {
    /// Lower quality, faster variant for mobile
    pub fast_mode: bool,
    /// Preserve the alpha channel instead of storing luma in it
    pub keep_alpha: bool,
}

impl Default for FxaaSettings {
    fn default() -> Self {
        Self { fast_mode: false, keep_alpha: false }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmaaQuality {
    Low,
    Medium,
    #[default]
    High,
}

impl SmaaQuality {
    fn keyword(self) -> &'static str {
        match self {
            Self::Low => "SMAA_PRESET_LOW",
            Self::Medium => "SMAA_PRESET_MEDIUM",
            Self::High => "SMAA_PRESET_HIGH",
        }
    }
}

/// Blue-noise textures cycled by the dithering step
pub const DITHERING_TEXTURE_COUNT: u64 = 64;

/// Set dithering state on the sheet of whichever pass writes the destination
pub fn apply_dithering(ctx: &mut RenderContext, shader: &'static str) {
    let frame = ctx.frame_index();
    let index = (frame % DITHERING_TEXTURE_COUNT) as f32;
    let offset_x = halton((frame % 1024) as u32 + 1, 2);
    let offset_y = halton((frame % 1024) as u32 + 1, 3);
    let sheet = ctx.sheets.get(shader);
    sheet.enable_keyword("DITHERING");
    sheet.set_vector("_Dithering_Coords", [index, offset_x, offset_y, 0.0]);
}

/// Final composite: optional FXAA/SMAA, dithering and vertical flip
pub struct FinalPass;

impl FinalPass {
    pub const SHADER: &'static str = "final_pass";

    pub fn render(
        ctx: &mut RenderContext,
        source: SurfaceRef,
        destination: SurfaceRef,
        mode: Antialiasing,
        fxaa: &FxaaSettings,
        smaa: SmaaQuality,
        dithering: bool,
    ) {
        ctx.command.begin_sample("FinalPass");
        ctx.sheets.get(Self::SHADER).clear();

        let mut smaa_targets = None;
        match mode {
            Antialiasing::Fxaa => {
                let sheet = ctx.sheets.get(Self::SHADER);
                sheet.enable_keyword(if fxaa.fast_mode { "FXAA_LOW" } else { "FXAA" });
                if fxaa.keep_alpha {
                    sheet.enable_keyword("FXAA_KEEP_ALPHA");
                }
            }
            Antialiasing::Smaa => {
                smaa_targets = Some(Self::smaa_weights(ctx, source, smaa));
            }
            _ => {}
        }

        if dithering {
            apply_dithering(ctx, Self::SHADER);
        }

        let flip = ctx.flip_destination();
        ctx.sheets.get(Self::SHADER).flush(&mut ctx.command);
        ctx.command.blit_flipped(source, destination, Self::SHADER, 0, flip);

        if let Some((edges, weights)) = smaa_targets {
            ctx.release_temporary(edges);
            ctx.release_temporary(weights);
        }
        ctx.command.end_sample("FinalPass");
    }

    /// Edge detection and blend weight passes; returns both scratch surfaces
    fn smaa_weights(
        ctx: &mut RenderContext,
        source: SurfaceRef,
        quality: SmaaQuality,
    ) -> (SurfaceHandle, SurfaceHandle) {
        let (w, h) = ctx.scaled_size();
        let edges = ctx.get_temporary_sized("smaa_edges", w, h, wgpu::TextureFormat::Rg8Unorm, false);
        let weights = ctx.get_temporary_sized("smaa_weights", w, h, wgpu::TextureFormat::Rgba8Unorm, false);

        let sheet = ctx.sheets.get("smaa");
        sheet.clear();
        sheet.enable_keyword(quality.keyword());
        sheet.flush(&mut ctx.command);
        ctx.command.blit(source, edges.into(), "smaa", 0);
        ctx.command.blit(edges.into(), weights.into(), "smaa", 1);

        let sheet = ctx.sheets.get(Self::SHADER);
        sheet.enable_keyword("SMAA");
        sheet.set_texture("_BlendTex", weights.into());
        (edges, weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::view::{Eye, View};
    use crate::render::caps::GpuCaps;
    use crate::render::command::{CameraSurface, Command};

    fn context() -> RenderContext {
        let mut ctx = RenderContext::new(GpuCaps::default());
        ctx.begin_eye(&View::new(1280, 720, 60.0), Eye::Left, 3);
        ctx
    }

    #[test]
    fn test_upscaler_kinds() {
        assert_eq!(Antialiasing::Fxaa.upscaler_kind(), None);
        assert_eq!(Antialiasing::Taa.upscaler_kind(), Some(UpscalerKind::Taa));
        assert_eq!(Antialiasing::Dlss.upscaler_kind(), Some(UpscalerKind::Dlss));
        assert!(Antialiasing::Smaa.is_final_pass_filter());
        assert!(!Antialiasing::Taa.is_final_pass_filter());
        assert_eq!(Antialiasing::from(FallbackMode::Fxaa), Antialiasing::Fxaa);
    }

    #[test]
    fn test_fxaa_final_pass() {
        let mut ctx = context();
        FinalPass::render(
            &mut ctx,
            CameraSurface::Color.into(),
            CameraSurface::Destination.into(),
            Antialiasing::Fxaa,
            &FxaaSettings { fast_mode: true, keep_alpha: false },
            SmaaQuality::High,
            true,
        );
        let sheet = ctx.sheets.peek(FinalPass::SHADER).unwrap();
        assert!(sheet.has_keyword("FXAA_LOW"));
        assert!(sheet.has_keyword("DITHERING"));
        assert_eq!(ctx.command.blit_shaders(), vec![FinalPass::SHADER]);
        assert_eq!(ctx.command.validate(), Ok(()));
    }

    #[test]
    fn test_smaa_releases_scratch() {
        let mut ctx = context();
        FinalPass::render(
            &mut ctx,
            CameraSurface::Color.into(),
            CameraSurface::Destination.into(),
            Antialiasing::Smaa,
            &FxaaSettings::default(),
            SmaaQuality::Medium,
            false,
        );
        assert_eq!(ctx.command.blit_shaders(), vec!["smaa", "smaa", FinalPass::SHADER]);
        assert_eq!(ctx.pool().live_count(), 0);
        assert_eq!(ctx.command.validate(), Ok(()));
    }

    #[test]
    fn test_flip_follows_destination_convention() {
        let mut ctx = RenderContext::new(GpuCaps::default());
        let mut view = View::new(640, 480, 60.0);
        view.flip_destination = true;
        ctx.begin_eye(&view, Eye::Left, 0);
        FinalPass::render(
            &mut ctx,
            CameraSurface::Color.into(),
            CameraSurface::Destination.into(),
            Antialiasing::None,
            &FxaaSettings::default(),
            SmaaQuality::High,
            false,
        );
        let flipped = ctx.command.commands().iter().any(|c| matches!(c, Command::Blit { flip_y: true, .. }));
        assert!(flipped);
    }
}
