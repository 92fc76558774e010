/// Shared frame uniforms. Must match `Globals` in `gpu.rs`.
const GLOBALS: &str = r#"
struct Light {
    // xyz: position (point) or direction (directional); w: 1 point, 0 directional
    position: vec4<f32>,
    // rgb: radiance; a: range, 0 = unbounded
    radiance: vec4<f32>,
};

struct Globals {
    view_proj: mat4x4<f32>,
    eye: vec4<f32>,
    cam_right: vec4<f32>,
    cam_up: vec4<f32>,
    ambient: vec4<f32>,
    // rgb: fog color; a: exp2 density
    fog: vec4<f32>,
    light_view_proj: mat4x4<f32>,
    // x: 1 when the shadow map is valid, y: depth bias, z: texel size
    shadow: vec4<f32>,
    light_count: vec4<u32>,
    lights: array<Light, 8>,
};

@group(0) @binding(0)
var<uniform> globals: Globals;

fn apply_fog(color: vec3<f32>, world_pos: vec3<f32>) -> vec3<f32> {
    let dist = distance(world_pos, globals.eye.xyz);
    let d = globals.fog.a * dist;
    let factor = 1.0 - exp(-d * d);
    return mix(color, globals.fog.rgb, clamp(factor, 0.0, 1.0));
}
"#;

/// Lit and unlit meshes with an optional color texture.
const MESH_BODY: &str = r#"
@group(0) @binding(1)
var t_shadow: texture_depth_2d;
@group(0) @binding(2)
var s_shadow: sampler_comparison;

@group(1) @binding(0)
var t_color: texture_2d<f32>;
@group(1) @binding(1)
var s_color: sampler;

// 3x3 PCF over the directional shadow map. 1.0 is fully lit.
fn shadow_factor(light_clip: vec4<f32>, receive: f32) -> f32 {
    if (globals.shadow.x < 0.5 || receive < 0.5) {
        return 1.0;
    }
    let ndc = light_clip.xyz / light_clip.w;
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    if (uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0 || ndc.z > 1.0) {
        return 1.0;
    }
    let reference = ndc.z - globals.shadow.y;
    var lit = 0.0;
    for (var x = -1; x <= 1; x = x + 1) {
        for (var y = -1; y <= 1; y = y + 1) {
            let offset = vec2<f32>(f32(x), f32(y)) * globals.shadow.z;
            lit = lit + textureSampleCompareLevel(t_shadow, s_shadow, uv + offset, reference);
        }
    }
    return lit / 9.0;
}

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

struct InstanceInput {
    @location(3) model_0: vec4<f32>,
    @location(4) model_1: vec4<f32>,
    @location(5) model_2: vec4<f32>,
    @location(6) model_3: vec4<f32>,
    // rgb: linear base color; a: opacity
    @location(7) color: vec4<f32>,
    @location(8) emissive: vec4<f32>,
    // x: roughness, y: metalness, z: 1 lit / 0 unlit, w: 1 receives shadows
    @location(9) params: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) color: vec4<f32>,
    @location(4) emissive: vec3<f32>,
    @location(5) params: vec4<f32>,
    @location(6) light_clip: vec4<f32>,
};

@vertex
fn vs_main(vertex: VertexInput, instance: InstanceInput) -> VertexOutput {
    let model = mat4x4<f32>(
        instance.model_0,
        instance.model_1,
        instance.model_2,
        instance.model_3,
    );
    let world_pos = model * vec4<f32>(vertex.position, 1.0);

    var out: VertexOutput;
    out.clip_position = globals.view_proj * world_pos;
    out.world_pos = world_pos.xyz;
    out.world_normal = (model * vec4<f32>(vertex.normal, 0.0)).xyz;
    out.uv = vertex.uv;
    out.color = instance.color;
    out.emissive = instance.emissive.rgb;
    out.params = instance.params;
    out.light_clip = globals.light_view_proj * world_pos;
    return out;
}

@fragment
fn fs_main(in: VertexOutput, @builtin(front_facing) front: bool) -> @location(0) vec4<f32> {
    let texel = textureSample(t_color, s_color, in.uv);
    let base = in.color.rgb * texel.rgb;
    let alpha = in.color.a * texel.a;

    if (in.params.z < 0.5) {
        return vec4<f32>(apply_fog(base + in.emissive, in.world_pos), alpha);
    }

    var n = normalize(in.world_normal);
    if (!front) {
        n = -n;
    }
    let v = normalize(globals.eye.xyz - in.world_pos);
    let roughness = clamp(in.params.x, 0.04, 1.0);
    let metalness = clamp(in.params.y, 0.0, 1.0);
    let shininess = mix(128.0, 4.0, roughness);
    let spec_color = mix(vec3<f32>(0.04), base, metalness);

    let sun_visibility = shadow_factor(in.light_clip, in.params.w);

    var diffuse = globals.ambient.rgb;
    var specular = vec3<f32>(0.0);
    for (var i = 0u; i < globals.light_count.x; i = i + 1u) {
        let light = globals.lights[i];
        var l: vec3<f32>;
        var attenuation = 1.0;
        if (light.position.w > 0.5) {
            let to_light = light.position.xyz - in.world_pos;
            let dist = length(to_light);
            l = to_light / max(dist, 1e-4);
            if (light.radiance.a > 0.0) {
                let window = clamp(1.0 - dist / light.radiance.a, 0.0, 1.0);
                attenuation = window * window;
            }
        } else {
            l = -normalize(light.position.xyz);
            attenuation = sun_visibility;
        }
        let n_dot_l = max(dot(n, l), 0.0);
        let radiance = light.radiance.rgb * attenuation;
        diffuse = diffuse + radiance * n_dot_l;
        let h = normalize(l + v);
        let spec = pow(max(dot(n, h), 0.0), shininess) * (1.0 - roughness);
        specular = specular + radiance * spec * n_dot_l;
    }

    let lit = base * diffuse * (1.0 - metalness) + spec_color * specular + in.emissive;
    return vec4<f32>(apply_fog(lit, in.world_pos), alpha);
}
"#;

/// Camera-facing soft discs for snow, steam and particles.
const SPRITE_BODY: &str = r#"
struct SpriteInput {
    // xyz: world position; w: size
    @location(0) position_size: vec4<f32>,
    // rgb: linear color; a: opacity
    @location(1) color: vec4<f32>,
};

struct SpriteOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) corner: vec2<f32>,
    @location(2) color: vec4<f32>,
};

@vertex
fn vs_sprite(@builtin(vertex_index) index: u32, sprite: SpriteInput) -> SpriteOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let corner = corners[index % 6u];
    let half = sprite.position_size.w;
    let world = sprite.position_size.xyz
        + globals.cam_right.xyz * corner.x * half
        + globals.cam_up.xyz * corner.y * half;

    var out: SpriteOutput;
    out.clip_position = globals.view_proj * vec4<f32>(world, 1.0);
    out.world_pos = world;
    out.corner = corner;
    out.color = sprite.color;
    return out;
}

@fragment
fn fs_sprite(in: SpriteOutput) -> @location(0) vec4<f32> {
    let r = length(in.corner);
    if (r > 1.0) {
        discard;
    }
    let falloff = 1.0 - smoothstep(0.55, 1.0, r);
    return vec4<f32>(apply_fog(in.color.rgb, in.world_pos), in.color.a * falloff);
}
"#;

/// Depth-only pass from the directional light.
const SHADOW: &str = r#"
struct ShadowGlobals {
    light_view_proj: mat4x4<f32>,
};

@group(0) @binding(0)
var<uniform> shadow_globals: ShadowGlobals;

struct CasterInput {
    @location(0) position: vec3<f32>,
    @location(3) model_0: vec4<f32>,
    @location(4) model_1: vec4<f32>,
    @location(5) model_2: vec4<f32>,
    @location(6) model_3: vec4<f32>,
};

@vertex
fn vs_shadow(caster: CasterInput) -> @builtin(position) vec4<f32> {
    let model = mat4x4<f32>(caster.model_0, caster.model_1, caster.model_2, caster.model_3);
    return shadow_globals.light_view_proj * model * vec4<f32>(caster.position, 1.0);
}
"#;

pub fn mesh_shader() -> String {
    format!("{GLOBALS}{MESH_BODY}")
}

pub fn sprite_shader() -> String {
    format!("{GLOBALS}{SPRITE_BODY}")
}

pub fn shadow_shader() -> &'static str {
    SHADOW
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shaders_share_globals_and_entry_points() {
        let mesh = mesh_shader();
        let sprite = sprite_shader();
        assert!(mesh.contains("var<uniform> globals"));
        assert!(sprite.contains("var<uniform> globals"));
        assert!(mesh.contains("fn vs_main") && mesh.contains("fn fs_main"));
        assert!(sprite.contains("fn vs_sprite") && sprite.contains("fn fs_sprite"));
        assert!(mesh.contains("array<Light, 8>"));
    }

    #[test]
    fn shadow_lookup_lives_in_the_lit_path() {
        let mesh = mesh_shader();
        assert!(mesh.contains("texture_depth_2d"));
        assert!(mesh.contains("sampler_comparison"));
        assert!(mesh.contains("attenuation = sun_visibility"));
        assert!(!sprite_shader().contains("t_shadow"));
        let shadow = shadow_shader();
        assert!(shadow.contains("fn vs_shadow"));
        assert!(!shadow.contains("@fragment"));
    }
}
