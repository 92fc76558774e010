use crate::gpu::DEPTH_FORMAT;
use cafescene_render::ShadowView;

/// Square depth map rendered from the directional light.
///
/// The same view is the attachment of the caster pass and a binding of the
/// lit pass; the two never share a render pass.
pub(crate) struct ShadowMap {
    pub(crate) view: wgpu::TextureView,
    size: u32,
}

impl ShadowMap {
    pub(crate) fn new(device: &wgpu::Device, size: u32) -> Self {
        let size = size.max(1);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow_map"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("shadow_map_view"),
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });
        tracing::debug!(size, "shadow map allocated");
        Self { view, size }
    }

    pub(crate) fn size(&self) -> u32 {
        self.size
    }
}

pub(crate) fn comparison_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("shadow_sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        compare: Some(wgpu::CompareFunction::LessEqual),
        ..Default::default()
    })
}

/// Slope-scaled bias applied while rasterizing casters.
pub(crate) fn caster_bias() -> wgpu::DepthBiasState {
    wgpu::DepthBiasState {
        constant: 2,
        slope_scale: 2.0,
        clamp: 0.0,
    }
}

/// `Globals.shadow`: x enabled, y depth bias, z texel size in uv units.
pub(crate) fn shadow_params(shadow: Option<&ShadowView>) -> [f32; 4] {
    match shadow {
        Some(s) => [1.0, s.depth_bias, 1.0 / s.map_size.max(1) as f32, 0.0],
        None => [0.0; 4],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cafescene_common::ShadowConfig;
    use glam::Vec3;

    #[test]
    fn params_encode_bias_and_texel() {
        assert_eq!(shadow_params(None), [0.0; 4]);
        let view = ShadowView::directional(Vec3::new(0.5, -1.0, -0.5), &ShadowConfig::default());
        let [enabled, bias, texel, _] = shadow_params(Some(&view));
        assert_eq!(enabled, 1.0);
        assert_eq!(bias, 0.002);
        assert_eq!(texel, 1.0 / 2048.0);
    }

    #[test]
    fn caster_bias_pushes_depth_away() {
        let bias = caster_bias();
        assert!(bias.constant > 0);
        assert!(bias.slope_scale > 0.0);
    }
}
