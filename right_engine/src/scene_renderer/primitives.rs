/// Built-in geometry: skybox cube and fullscreen quad

/// 36 `vec3` positions of a cube spanning [-1, 1]
#[rustfmt::skip]
pub const SKYBOX_VERTICES: [f32; 108] = [
    // back
    -1.0, -1.0, -1.0,   1.0,  1.0, -1.0,   1.0, -1.0, -1.0,
     1.0,  1.0, -1.0,  -1.0, -1.0, -1.0,  -1.0,  1.0, -1.0,
    // front
    -1.0, -1.0,  1.0,   1.0, -1.0,  1.0,   1.0,  1.0,  1.0,
     1.0,  1.0,  1.0,  -1.0,  1.0,  1.0,  -1.0, -1.0,  1.0,
    // left
    -1.0,  1.0,  1.0,  -1.0,  1.0, -1.0,  -1.0, -1.0, -1.0,
    -1.0, -1.0, -1.0,  -1.0, -1.0,  1.0,  -1.0,  1.0,  1.0,
    // right
     1.0,  1.0,  1.0,   1.0, -1.0, -1.0,   1.0,  1.0, -1.0,
     1.0, -1.0, -1.0,   1.0,  1.0,  1.0,   1.0, -1.0,  1.0,
    // bottom
    -1.0, -1.0, -1.0,   1.0, -1.0, -1.0,   1.0, -1.0,  1.0,
     1.0, -1.0,  1.0,  -1.0, -1.0,  1.0,  -1.0, -1.0, -1.0,
    // top
    -1.0,  1.0, -1.0,   1.0,  1.0,  1.0,   1.0,  1.0, -1.0,
     1.0,  1.0,  1.0,  -1.0,  1.0, -1.0,  -1.0,  1.0,  1.0,
];

/// 6 vertices of `(position: vec2, uv: vec2)`
#[rustfmt::skip]
pub const QUAD_VERTICES: [f32; 24] = [
    -1.0,  1.0,  0.0, 1.0,
     1.0,  1.0,  1.0, 1.0,
     1.0, -1.0,  1.0, 0.0,
     1.0, -1.0,  1.0, 0.0,
    -1.0, -1.0,  0.0, 0.0,
    -1.0,  1.0,  0.0, 1.0,
];
