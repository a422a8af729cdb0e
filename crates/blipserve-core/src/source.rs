use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{bail, ensure, Context, Result};
use bytes::Bytes;
use image::{ImageReader, RgbImage};

/// Where the pixels of one image element come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Encoded(Bytes),
}

impl ImageSource {
    /// Classifies one element of an image tensor.
    ///
    /// An element naming an existing file is a path even if its first bytes happen to look
    /// like an image signature. Otherwise recognised image bytes are decoded in memory and
    /// any remaining UTF-8 is taken as a path that will fail on read if it does not exist.
    pub fn from_element(element: Bytes) -> Result<Self> {
        ensure!(!element.is_empty(), "image element is empty");

        let as_path = std::str::from_utf8(&element).ok().map(PathBuf::from);
        if let Some(path) = &as_path {
            if path.is_file() {
                return Ok(ImageSource::Path(path.clone()));
            }
        }

        if image::guess_format(&element).is_ok() {
            return Ok(ImageSource::Encoded(element));
        }

        match as_path {
            Some(path) => Ok(ImageSource::Path(path)),
            None => bail!("image element is neither a known image format nor a UTF-8 path"),
        }
    }

    pub fn read(&self) -> Result<Bytes> {
        match self {
            ImageSource::Path(path) => std::fs::read(path)
                .map(Bytes::from)
                .with_context(|| format!("failed to read image {}", path.display())),
            ImageSource::Encoded(bytes) => Ok(bytes.clone()),
        }
    }

    /// Reads and decodes to 8-bit RGB, whatever the stored format.
    pub fn decode(&self) -> Result<RgbImage> {
        let data = self.read()?;
        let image = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .context("failed to sniff image format")?
            .decode()
            .with_context(|| format!("failed to decode image {}", self.describe()))?;
        Ok(image.to_rgb8())
    }

    pub fn describe(&self) -> String {
        match self {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Encoded(bytes) => format!("<{} encoded bytes>", bytes.len()),
        }
    }
}
