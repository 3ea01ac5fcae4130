use std::path::Path;

use super::ResourceId;
use crate::error::{RenderError, Result};
use crate::io;
use crate::time::Stamp;

/// Pixel layout of CPU texture data. Half float formats hold little-endian
/// `f16` channels, the 32 bit float formats hold `f32` channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    R8,
    Rg8,
    Rgb8,
    Rgba8,
    Srgb8,
    Srgba8,
    R16F,
    Rg16F,
    Rgb16F,
    Rgba16F,
    Rgb32F,
    Rgba32F,
}

impl Format {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Format::R8 => 1,
            Format::Rg8 | Format::R16F => 2,
            Format::Rgb8 | Format::Srgb8 => 3,
            Format::Rgba8 | Format::Srgba8 | Format::Rg16F => 4,
            Format::Rgb16F => 6,
            Format::Rgba16F => 8,
            Format::Rgb32F => 12,
            Format::Rgba32F => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Wrap {
    #[default]
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    #[default]
    Linear,
    Closest,
}

/// Properties shared by every texture kind.
#[derive(Debug, Clone)]
pub struct TextureData {
    id: ResourceId,
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub wrap: Wrap,
    pub filter: Filter,
    modified: Stamp,
}

impl TextureData {
    fn new(width: u32, height: u32, format: Format, wrap: Wrap, filter: Filter) -> Self {
        Self {
            id: ResourceId::next(),
            width,
            height,
            format,
            wrap,
            filter,
            modified: Stamp::now(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn modified(&self) -> Stamp {
        self.modified
    }

    fn layer_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    fn check_layer(&self, pixels: &[u8]) -> Result<()> {
        if pixels.is_empty() || pixels.len() == self.layer_size() {
            Ok(())
        } else {
            Err(RenderError::InvalidData {
                what: "texture data",
                reason: format!(
                    "expected {} bytes for {}x{} {:?}, got {}",
                    self.layer_size(),
                    self.width,
                    self.height,
                    self.format,
                    pixels.len()
                ),
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct Texture2D {
    data: TextureData,
    pixels: Vec<u8>,
}

impl Texture2D {
    /// Empty pixels allocate storage without uploading, as render targets do.
    pub fn new(
        width: u32,
        height: u32,
        format: Format,
        pixels: Vec<u8>,
        wrap: Wrap,
        filter: Filter,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidData {
                what: "texture size",
                reason: format!("{width}x{height}"),
            });
        }
        let data = TextureData::new(width, height, format, wrap, filter);
        data.check_layer(&pixels)?;
        Ok(Self { data, pixels })
    }

    pub fn empty(width: u32, height: u32, format: Format) -> Result<Self> {
        Self::new(width, height, format, Vec::new(), Wrap::ClampToEdge, Filter::Linear)
    }

    pub fn from_color(color: [u8; 4]) -> Self {
        Self {
            data: TextureData::new(1, 1, Format::Rgba8, Wrap::Repeat, Filter::Closest),
            pixels: color.to_vec(),
        }
    }

    /// Decode an image file. Color data lands in an sRGB format, everything
    /// else (normals, roughness, ...) stays linear.
    pub fn from_path(path: impl AsRef<Path>, color_data: bool) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading texture: {:?}", path);

        let bytes = io::load_binary(path)?;
        let img = image::load_from_memory(&bytes).map_err(|source| RenderError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let format = if color_data {
            Format::Srgba8
        } else {
            Format::Rgba8
        };

        Self::new(
            width,
            height,
            format,
            rgba.into_raw(),
            Wrap::Repeat,
            Filter::Linear,
        )
    }

    pub fn data(&self) -> &TextureData {
        &self.data
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn set_pixels(&mut self, pixels: Vec<u8>) -> Result<()> {
        self.data.check_layer(&pixels)?;
        self.pixels = pixels;
        self.data.modified = Stamp::now();
        Ok(())
    }
}

/// Six square faces in +X, -X, +Y, -Y, +Z, -Z order.
#[derive(Debug, Clone)]
pub struct TextureCube {
    data: TextureData,
    faces: [Vec<u8>; 6],
}

impl TextureCube {
    pub fn new(size: u32, format: Format, faces: [Vec<u8>; 6], filter: Filter) -> Result<Self> {
        if size == 0 {
            return Err(RenderError::InvalidData {
                what: "cube texture size",
                reason: "0".into(),
            });
        }
        let data = TextureData::new(size, size, format, Wrap::ClampToEdge, filter);
        for face in &faces {
            data.check_layer(face)?;
        }
        Ok(Self { data, faces })
    }

    pub fn empty(size: u32, format: Format) -> Result<Self> {
        Self::new(size, format, Default::default(), Filter::Linear)
    }

    pub fn from_color(color: [u8; 4]) -> Self {
        Self {
            data: TextureData::new(1, 1, Format::Rgba8, Wrap::ClampToEdge, Filter::Closest),
            faces: std::array::from_fn(|_| color.to_vec()),
        }
    }

    pub fn data(&self) -> &TextureData {
        &self.data
    }

    pub fn faces(&self) -> &[Vec<u8>; 6] {
        &self.faces
    }

    pub fn set_face(&mut self, face: usize, pixels: Vec<u8>) -> Result<()> {
        self.data.check_layer(&pixels)?;
        let slot = self.faces.get_mut(face).ok_or(RenderError::InvalidData {
            what: "cube face",
            reason: format!("index {face} out of range"),
        })?;
        *slot = pixels;
        self.data.modified = Stamp::now();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Texture {
    Texture2D(Texture2D),
    TextureCube(TextureCube),
}

impl Texture {
    pub fn data(&self) -> &TextureData {
        match self {
            Texture::Texture2D(texture) => texture.data(),
            Texture::TextureCube(texture) => texture.data(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.data().id()
    }

    pub fn modified(&self) -> Stamp {
        self.data().modified()
    }

    pub fn is_cube(&self) -> bool {
        matches!(self, Texture::TextureCube(_))
    }

    /// Pixel data per array layer. Empty layers carry no upload.
    pub fn layers(&self) -> Vec<&[u8]> {
        match self {
            Texture::Texture2D(texture) => vec![texture.pixels()],
            Texture::TextureCube(texture) => texture.faces().iter().map(Vec::as_slice).collect(),
        }
    }
}

impl From<Texture2D> for Texture {
    fn from(texture: Texture2D) -> Self {
        Texture::Texture2D(texture)
    }
}

impl From<TextureCube> for Texture {
    fn from(texture: TextureCube) -> Self {
        Texture::TextureCube(texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_pixel_count() {
        let result = Texture2D::new(2, 2, Format::Rgba8, vec![0; 15], Wrap::Repeat, Filter::Linear);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_size() {
        assert!(Texture2D::empty(0, 4, Format::Rgba8).is_err());
        assert!(TextureCube::empty(0, Format::Rgba16F).is_err());
    }

    #[test]
    fn set_pixels_refreshes_stamp() {
        let mut texture = Texture2D::from_color([255, 0, 0, 255]);
        let before = texture.data().modified();
        texture.set_pixels(vec![0, 255, 0, 255]).expect("same size");
        assert!(texture.data().modified() > before);
        assert_eq!(texture.pixels(), &[0, 255, 0, 255]);
    }

    #[test]
    fn cube_has_six_layers() {
        let cube: Texture = TextureCube::from_color([0, 0, 0, 255]).into();
        assert!(cube.is_cube());
        assert_eq!(cube.layers().len(), 6);
    }

    #[test]
    fn clones_share_identity() {
        let texture = Texture2D::from_color([1, 2, 3, 4]);
        assert_eq!(texture.clone().data().id(), texture.data().id());
    }
}
