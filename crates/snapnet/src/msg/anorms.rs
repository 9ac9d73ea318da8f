use glam::Vec3;

pub const NUM_VERTEX_NORMALS: usize = 162;

/// Unit vectors that `write_dir` quantizes a direction onto.
#[rustfmt::skip]
pub static BYTE_DIRS: [Vec3; NUM_VERTEX_NORMALS] = [
    Vec3::new(-0.525731, 0.000000, 0.850651),
    Vec3::new(-0.442863, 0.238856, 0.864188),
    Vec3::new(-0.295242, 0.000000, 0.955423),
    Vec3::new(-0.309017, 0.500000, 0.809017),
    Vec3::new(-0.162460, 0.262866, 0.951056),
    Vec3::new(0.000000, 0.000000, 1.000000),
    Vec3::new(0.000000, 0.850651, 0.525731),
    Vec3::new(-0.147621, 0.716567, 0.681718),
    Vec3::new(0.147621, 0.716567, 0.681718),
    Vec3::new(0.000000, 0.525731, 0.850651),
    Vec3::new(0.309017, 0.500000, 0.809017),
    Vec3::new(0.525731, 0.000000, 0.850651),
    Vec3::new(0.295242, 0.000000, 0.955423),
    Vec3::new(0.442863, 0.238856, 0.864188),
    Vec3::new(0.162460, 0.262866, 0.951056),
    Vec3::new(-0.681718, 0.147621, 0.716567),
    Vec3::new(-0.809017, 0.309017, 0.500000),
    Vec3::new(-0.587785, 0.425325, 0.688191),
    Vec3::new(-0.850651, 0.525731, 0.000000),
    Vec3::new(-0.864188, 0.442863, 0.238856),
    Vec3::new(-0.716567, 0.681718, 0.147621),
    Vec3::new(-0.688191, 0.587785, 0.425325),
    Vec3::new(-0.500000, 0.809017, 0.309017),
    Vec3::new(-0.238856, 0.864188, 0.442863),
    Vec3::new(-0.425325, 0.688191, 0.587785),
    Vec3::new(-0.716567, 0.681718, -0.147621),
    Vec3::new(-0.500000, 0.809017, -0.309017),
    Vec3::new(-0.525731, 0.850651, 0.000000),
    Vec3::new(0.000000, 0.850651, -0.525731),
    Vec3::new(-0.238856, 0.864188, -0.442863),
    Vec3::new(0.000000, 0.955423, -0.295242),
    Vec3::new(-0.262866, 0.951056, -0.162460),
    Vec3::new(0.000000, 1.000000, 0.000000),
    Vec3::new(0.000000, 0.955423, 0.295242),
    Vec3::new(-0.262866, 0.951056, 0.162460),
    Vec3::new(0.238856, 0.864188, 0.442863),
    Vec3::new(0.262866, 0.951056, 0.162460),
    Vec3::new(0.500000, 0.809017, 0.309017),
    Vec3::new(0.238856, 0.864188, -0.442863),
    Vec3::new(0.262866, 0.951056, -0.162460),
    Vec3::new(0.500000, 0.809017, -0.309017),
    Vec3::new(0.850651, 0.525731, 0.000000),
    Vec3::new(0.716567, 0.681718, 0.147621),
    Vec3::new(0.716567, 0.681718, -0.147621),
    Vec3::new(0.525731, 0.850651, 0.000000),
    Vec3::new(0.425325, 0.688191, 0.587785),
    Vec3::new(0.864188, 0.442863, 0.238856),
    Vec3::new(0.688191, 0.587785, 0.425325),
    Vec3::new(0.809017, 0.309017, 0.500000),
    Vec3::new(0.681718, 0.147621, 0.716567),
    Vec3::new(0.587785, 0.425325, 0.688191),
    Vec3::new(0.955423, 0.295242, 0.000000),
    Vec3::new(1.000000, 0.000000, 0.000000),
    Vec3::new(0.951056, 0.162460, 0.262866),
    Vec3::new(0.850651, -0.525731, 0.000000),
    Vec3::new(0.955423, -0.295242, 0.000000),
    Vec3::new(0.864188, -0.442863, 0.238856),
    Vec3::new(0.951056, -0.162460, 0.262866),
    Vec3::new(0.809017, -0.309017, 0.500000),
    Vec3::new(0.681718, -0.147621, 0.716567),
    Vec3::new(0.850651, 0.000000, 0.525731),
    Vec3::new(0.864188, 0.442863, -0.238856),
    Vec3::new(0.809017, 0.309017, -0.500000),
    Vec3::new(0.951056, 0.162460, -0.262866),
    Vec3::new(0.525731, 0.000000, -0.850651),
    Vec3::new(0.681718, 0.147621, -0.716567),
    Vec3::new(0.681718, -0.147621, -0.716567),
    Vec3::new(0.850651, 0.000000, -0.525731),
    Vec3::new(0.809017, -0.309017, -0.500000),
    Vec3::new(0.864188, -0.442863, -0.238856),
    Vec3::new(0.951056, -0.162460, -0.262866),
    Vec3::new(0.147621, 0.716567, -0.681718),
    Vec3::new(0.309017, 0.500000, -0.809017),
    Vec3::new(0.425325, 0.688191, -0.587785),
    Vec3::new(0.442863, 0.238856, -0.864188),
    Vec3::new(0.587785, 0.425325, -0.688191),
    Vec3::new(0.688191, 0.587785, -0.425325),
    Vec3::new(-0.147621, 0.716567, -0.681718),
    Vec3::new(-0.309017, 0.500000, -0.809017),
    Vec3::new(0.000000, 0.525731, -0.850651),
    Vec3::new(-0.525731, 0.000000, -0.850651),
    Vec3::new(-0.442863, 0.238856, -0.864188),
    Vec3::new(-0.295242, 0.000000, -0.955423),
    Vec3::new(-0.162460, 0.262866, -0.951056),
    Vec3::new(0.000000, 0.000000, -1.000000),
    Vec3::new(0.295242, 0.000000, -0.955423),
    Vec3::new(0.162460, 0.262866, -0.951056),
    Vec3::new(-0.442863, -0.238856, -0.864188),
    Vec3::new(-0.309017, -0.500000, -0.809017),
    Vec3::new(-0.162460, -0.262866, -0.951056),
    Vec3::new(0.000000, -0.850651, -0.525731),
    Vec3::new(-0.147621, -0.716567, -0.681718),
    Vec3::new(0.147621, -0.716567, -0.681718),
    Vec3::new(0.000000, -0.525731, -0.850651),
    Vec3::new(0.309017, -0.500000, -0.809017),
    Vec3::new(0.442863, -0.238856, -0.864188),
    Vec3::new(0.162460, -0.262866, -0.951056),
    Vec3::new(0.238856, -0.864188, -0.442863),
    Vec3::new(0.500000, -0.809017, -0.309017),
    Vec3::new(0.425325, -0.688191, -0.587785),
    Vec3::new(0.716567, -0.681718, -0.147621),
    Vec3::new(0.688191, -0.587785, -0.425325),
    Vec3::new(0.587785, -0.425325, -0.688191),
    Vec3::new(0.000000, -0.955423, -0.295242),
    Vec3::new(0.000000, -1.000000, 0.000000),
    Vec3::new(0.262866, -0.951056, -0.162460),
    Vec3::new(0.000000, -0.850651, 0.525731),
    Vec3::new(0.000000, -0.955423, 0.295242),
    Vec3::new(0.238856, -0.864188, 0.442863),
    Vec3::new(0.262866, -0.951056, 0.162460),
    Vec3::new(0.500000, -0.809017, 0.309017),
    Vec3::new(0.716567, -0.681718, 0.147621),
    Vec3::new(0.525731, -0.850651, 0.000000),
    Vec3::new(-0.238856, -0.864188, -0.442863),
    Vec3::new(-0.500000, -0.809017, -0.309017),
    Vec3::new(-0.262866, -0.951056, -0.162460),
    Vec3::new(-0.850651, -0.525731, 0.000000),
    Vec3::new(-0.716567, -0.681718, -0.147621),
    Vec3::new(-0.716567, -0.681718, 0.147621),
    Vec3::new(-0.525731, -0.850651, 0.000000),
    Vec3::new(-0.500000, -0.809017, 0.309017),
    Vec3::new(-0.238856, -0.864188, 0.442863),
    Vec3::new(-0.262866, -0.951056, 0.162460),
    Vec3::new(-0.864188, -0.442863, 0.238856),
    Vec3::new(-0.809017, -0.309017, 0.500000),
    Vec3::new(-0.688191, -0.587785, 0.425325),
    Vec3::new(-0.681718, -0.147621, 0.716567),
    Vec3::new(-0.442863, -0.238856, 0.864188),
    Vec3::new(-0.587785, -0.425325, 0.688191),
    Vec3::new(-0.309017, -0.500000, 0.809017),
    Vec3::new(-0.147621, -0.716567, 0.681718),
    Vec3::new(-0.425325, -0.688191, 0.587785),
    Vec3::new(-0.162460, -0.262866, 0.951056),
    Vec3::new(0.442863, -0.238856, 0.864188),
    Vec3::new(0.162460, -0.262866, 0.951056),
    Vec3::new(0.309017, -0.500000, 0.809017),
    Vec3::new(0.147621, -0.716567, 0.681718),
    Vec3::new(0.000000, -0.525731, 0.850651),
    Vec3::new(0.425325, -0.688191, 0.587785),
    Vec3::new(0.587785, -0.425325, 0.688191),
    Vec3::new(0.688191, -0.587785, 0.425325),
    Vec3::new(-0.955423, 0.295242, 0.000000),
    Vec3::new(-0.951056, 0.162460, 0.262866),
    Vec3::new(-1.000000, 0.000000, 0.000000),
    Vec3::new(-0.850651, 0.000000, 0.525731),
    Vec3::new(-0.955423, -0.295242, 0.000000),
    Vec3::new(-0.951056, -0.162460, 0.262866),
    Vec3::new(-0.864188, 0.442863, -0.238856),
    Vec3::new(-0.951056, 0.162460, -0.262866),
    Vec3::new(-0.809017, 0.309017, -0.500000),
    Vec3::new(-0.864188, -0.442863, -0.238856),
    Vec3::new(-0.951056, -0.162460, -0.262866),
    Vec3::new(-0.809017, -0.309017, -0.500000),
    Vec3::new(-0.681718, 0.147621, -0.716567),
    Vec3::new(-0.681718, -0.147621, -0.716567),
    Vec3::new(-0.850651, 0.000000, -0.525731),
    Vec3::new(-0.688191, 0.587785, -0.425325),
    Vec3::new(-0.587785, 0.425325, -0.688191),
    Vec3::new(-0.425325, 0.688191, -0.587785),
    Vec3::new(-0.425325, -0.688191, -0.587785),
    Vec3::new(-0.587785, -0.425325, -0.688191),
    Vec3::new(-0.688191, -0.587785, -0.425325),
];
