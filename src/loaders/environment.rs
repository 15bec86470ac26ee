use std::f32::consts::PI;

use glam::Vec3;

use super::texture::decode_image;
use crate::error::LoadError;
use crate::gpu::{EnvironmentUpload, GraphicsDevice, ImageData, ResourceId};

/// Face order expected for cubemaps: +X, -X, +Y, -Y, +Z, -Z
pub const FACE_NAMES: [&str; 6] = ["px", "nx", "py", "ny", "pz", "nz"];

// Cosine lobe convolution per SH band, folded with 1/pi so the shader's
// plain basis sum yields diffuse irradiance
const BAND_WEIGHTS: [f32; 3] = [1.0, 2.0 / 3.0, 0.25];

/// Cubemap faces plus their diffuse irradiance as 9 SH coefficients
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentMap {
    pub size: u32,
    pub faces: [Vec<u8>; 6],
    pub irradiance: [[f32; 3]; 9],
}

impl EnvironmentMap {
    /// Decode six face images and pre-filter irradiance
    pub fn decode(urls: &[String; 6], bytes: &[Vec<u8>; 6]) -> Result<Self, LoadError> {
        let mut faces: Vec<ImageData> = Vec::with_capacity(6);
        for (url, data) in urls.iter().zip(bytes.iter()) {
            faces.push(decode_image(url, data)?);
        }
        Self::from_faces(faces)
    }

    pub fn from_faces(faces: Vec<ImageData>) -> Result<Self, LoadError> {
        let faces: [ImageData; 6] = faces
            .try_into()
            .map_err(|faces: Vec<ImageData>| LoadError::InvalidEnvironment(format!("expected 6 faces, got {}", faces.len())))?;

        let size = faces[0].width;
        for (name, face) in FACE_NAMES.iter().zip(faces.iter()) {
            if face.width != face.height || face.width != size || size == 0 {
                return Err(LoadError::InvalidEnvironment(format!(
                    "face {} is {}x{}, expected {}x{}",
                    name, face.width, face.height, size, size
                )));
            }
            let expected = (size as usize) * (size as usize) * 4;
            if face.rgba.len() != expected {
                return Err(LoadError::InvalidEnvironment(format!(
                    "face {} has {} bytes, expected {}",
                    name,
                    face.rgba.len(),
                    expected
                )));
            }
        }

        let irradiance = project_irradiance(size, &faces);
        log::debug!("environment {}px, irradiance dc {:?}", size, irradiance[0]);

        Ok(Self {
            size,
            faces: faces.map(|face| face.rgba),
            irradiance,
        })
    }

    pub fn upload(&self, device: &mut dyn GraphicsDevice) -> ResourceId {
        device.upload_environment(&EnvironmentUpload {
            size: self.size,
            faces: [
                &self.faces[0],
                &self.faces[1],
                &self.faces[2],
                &self.faces[3],
                &self.faces[4],
                &self.faces[5],
            ],
            irradiance: self.irradiance,
        })
    }
}

/// World direction through texel (`u`, `v`) in [-1, 1] of cube face `face`
pub fn face_direction(face: usize, u: f32, v: f32) -> Vec3 {
    let dir = match face {
        0 => Vec3::new(1.0, -v, -u),
        1 => Vec3::new(-1.0, -v, u),
        2 => Vec3::new(u, 1.0, v),
        3 => Vec3::new(u, -1.0, -v),
        4 => Vec3::new(u, -v, 1.0),
        _ => Vec3::new(-u, -v, -1.0),
    };
    dir.normalize()
}

/// Real SH basis up to band 2, same constants as `irradiance()` in mesh.wgsl
fn basis(n: Vec3) -> [f32; 9] {
    [
        0.282095,
        0.488603 * n.y,
        0.488603 * n.z,
        0.488603 * n.x,
        1.092548 * n.x * n.y,
        1.092548 * n.y * n.z,
        0.315392 * (3.0 * n.z * n.z - 1.0),
        1.092548 * n.x * n.z,
        0.546274 * (n.x * n.x - n.y * n.y),
    ]
}

fn srgb_to_linear(c: u8) -> f32 {
    let c = c as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Project radiance onto SH9 and convolve with the cosine lobe
pub fn project_irradiance(size: u32, faces: &[ImageData; 6]) -> [[f32; 3]; 9] {
    let mut coefficients = [Vec3::ZERO; 9];
    let mut total_weight = 0.0f32;
    let inv = 1.0 / size as f32;

    for (index, face) in faces.iter().enumerate() {
        for y in 0..size {
            for x in 0..size {
                let u = 2.0 * (x as f32 + 0.5) * inv - 1.0;
                let v = 2.0 * (y as f32 + 0.5) * inv - 1.0;
                // Solid angle of the texel, up to a constant factor
                let weight = 1.0 / (1.0 + u * u + v * v).powf(1.5);

                let offset = ((y * size + x) * 4) as usize;
                let Some(texel) = face.rgba.get(offset..offset + 3) else {
                    continue;
                };
                let radiance = Vec3::new(
                    srgb_to_linear(texel[0]),
                    srgb_to_linear(texel[1]),
                    srgb_to_linear(texel[2]),
                );

                let dir = face_direction(index, u, v);
                for (coefficient, y_lm) in coefficients.iter_mut().zip(basis(dir)) {
                    *coefficient += radiance * y_lm * weight;
                }
                total_weight += weight;
            }
        }
    }

    let norm = 4.0 * PI / total_weight.max(f32::EPSILON);
    let mut out = [[0.0; 3]; 9];
    for (i, (slot, coefficient)) in out.iter_mut().zip(coefficients).enumerate() {
        let band = match i {
            0 => 0,
            1..=3 => 1,
            _ => 2,
        };
        *slot = (coefficient * norm * BAND_WEIGHTS[band]).to_array();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_faces(size: u32, value: u8) -> Vec<ImageData> {
        (0..6)
            .map(|_| ImageData {
                width: size,
                height: size,
                rgba: [value, value, value, 255].repeat((size * size) as usize),
            })
            .collect()
    }

    fn evaluate(sh: &[[f32; 3]; 9], n: Vec3) -> f32 {
        sh.iter().zip(basis(n)).map(|(c, b)| c[0] * b).sum()
    }

    #[test]
    fn uniform_white_environment_gives_unit_irradiance() {
        let env = EnvironmentMap::from_faces(uniform_faces(8, 255)).unwrap();

        for n in [Vec3::X, Vec3::Y, Vec3::NEG_Z] {
            let e = evaluate(&env.irradiance, n);
            assert!((e - 1.0).abs() < 1e-3, "irradiance {} along {:?}", e, n);
        }
        // Higher bands vanish for a constant environment
        assert!(env.irradiance[1..].iter().all(|c| c[0].abs() < 1e-3));
    }

    #[test]
    fn bright_sky_lights_upward_normals() {
        let mut faces = uniform_faces(4, 0);
        faces[2] = uniform_faces(4, 255).remove(0); // +Y face

        let env = EnvironmentMap::from_faces(faces).unwrap();
        assert!(evaluate(&env.irradiance, Vec3::Y) > evaluate(&env.irradiance, Vec3::NEG_Y));
    }

    #[test]
    fn rejects_mismatched_faces() {
        let mut faces = uniform_faces(4, 128);
        faces[3].width = 8;
        assert!(matches!(
            EnvironmentMap::from_faces(faces),
            Err(LoadError::InvalidEnvironment(_))
        ));

        assert!(EnvironmentMap::from_faces(uniform_faces(4, 0)[..5].to_vec()).is_err());
    }

    #[test]
    fn rejects_face_with_short_pixel_data() {
        let mut faces = uniform_faces(4, 128);
        faces[1].rgba.truncate(10);

        let err = EnvironmentMap::from_faces(faces).unwrap_err();
        assert!(err.to_string().contains("face"), "{}", err);
        assert!(matches!(err, LoadError::InvalidEnvironment(_)));
    }

    #[test]
    fn irradiance_skips_missing_texels() {
        let mut faces: [ImageData; 6] = uniform_faces(4, 255).try_into().unwrap();
        faces[0].rgba.clear();

        let sh = project_irradiance(4, &faces);
        assert!(sh[0].iter().all(|c| c.is_finite()));
    }

    #[test]
    fn face_directions_point_outward() {
        let centers = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
        for (face, expected) in centers.iter().enumerate() {
            assert!(face_direction(face, 0.0, 0.0).abs_diff_eq(*expected, 1e-6));
        }
    }
}
