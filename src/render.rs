use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use image::{ImageBuffer, ImageFormat, Rgba, RgbaImage};
use qrcode::types::QrError;
use qrcode::{Color, QrCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::colors::QrColors;
use crate::error::{Error, Result};
use crate::optimize::EccLevel;

/*---- Encoding ----*/

/// The module grid of an encoded QR symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrMatrix {
    size: i32,
    ecc: EccLevel,
    modules: Vec<bool>,
}

impl QrMatrix {
    /// Returns this code's size in modules, in the range [21, 177].
    pub fn size(&self) -> i32 {
        self.size
    }

    /// Returns this code's version, in the range [1, 40].
    pub fn version(&self) -> i32 {
        (self.size - 17) / 4
    }

    pub fn ecc(&self) -> EccLevel {
        self.ecc
    }

    /// Returns `true` for a dark module. Coordinates outside the symbol are light.
    pub fn get_module(&self, x: i32, y: i32) -> bool {
        let range = 0..self.size;
        range.contains(&x) && range.contains(&y) && self.modules[(y * self.size + x) as usize]
    }
}

/// Encodes `content` with the `qrcode` crate at the given error correction level.
///
/// # Errors
///
/// Returns [`Error::DataTooLong`] when the content exceeds version 40 capacity at `ecc`.
pub fn encode(content: &str, ecc: EccLevel) -> Result<QrMatrix> {
    let code = QrCode::with_error_correction_level(content.as_bytes(), ecc.to_qrcode())
        .map_err(|e| match e {
            QrError::DataTooLong => Error::DataTooLong(content.len()),
            other => Error::Encode(other.to_string()),
        })?;
    let size = code.width() as i32;
    let modules = code.to_colors().into_iter().map(|c| c == Color::Dark).collect();
    debug!(bytes = content.len(), size, ecc = %ecc, "encoded QR symbol");
    Ok(QrMatrix { size, ecc, modules })
}

/*---- Rendering ----*/

/// Raster and vector output settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Fixed error-correction level. `None` uses the level recommended for the content.
    pub ecc: Option<EccLevel>,
    /// Target image width in pixels. Ignored when smaller than one pixel per module.
    pub width: u32,
    /// Quiet zone around the symbol, in modules.
    pub margin: u32,
    pub colors: QrColors,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            ecc: None,
            width: 256,
            margin: 4,
            colors: QrColors::default(),
        }
    }
}

/// Rasterizes a QR matrix.
///
/// The image is `options.width` pixels wide when that allows at least one pixel per module
/// (quiet zone included); otherwise every module is one pixel.
///
/// # Arguments
///
/// * `qr` - The encoded symbol.
/// * `options` - Width, margin and colors.
///
/// # Example
///
/// ```rust
/// use qrsmith::optimize::EccLevel;
/// use qrsmith::render::{encode, to_image, RenderOptions};
///
/// let qr = encode("Hello, world!", EccLevel::L).unwrap();
/// let img = to_image(&qr, &RenderOptions { width: 0, ..Default::default() });
/// assert_eq!(img.dimensions(), (29, 29));
/// ```
pub fn to_image(qr: &QrMatrix, options: &RenderOptions) -> RgbaImage {
    let margin = options.margin as i32;
    let total = qr.size() + 2 * margin;
    let (image_width, scale) = if options.width as i32 >= total {
        (options.width, f64::from(options.width) / f64::from(total))
    } else {
        (total as u32, 1.0)
    };
    let dark = Rgba(options.colors.foreground.to_rgba());
    let light = Rgba(options.colors.background.to_rgba());

    ImageBuffer::from_fn(image_width, image_width, |x, y| {
        let qr_x = (f64::from(x) / scale).floor() as i32 - margin;
        let qr_y = (f64::from(y) / scale).floor() as i32 - margin;
        if qr.get_module(qr_x, qr_y) {
            dark
        } else {
            light
        }
    })
}

/// PNG-encodes an image as a `data:` URL.
pub fn to_data_url(img: &RgbaImage) -> Result<String> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)?;
    let encoded = general_purpose::STANDARD.encode(buffer.get_ref());
    Ok(format!("data:image/png;base64,{encoded}"))
}

// Returns a string of SVG code for an image depicting the given QR code, with the given
// number of border modules and colors. Uses Unix newlines regardless of platform.
pub fn to_svg_string(qr: &QrMatrix, options: &RenderOptions) -> String {
    let border = options.margin as i32;
    let dimension = qr.size() + border * 2;
    let mut result = String::new();
    result += "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
    result += &format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" width=\"{1}\" height=\"{1}\" viewBox=\"0 0 {0} {0}\" stroke=\"none\">\n",
        dimension,
        options.width.max(dimension as u32)
    );
    result += &format!(
        "\t<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>\n",
        options.colors.background
    );
    result += "\t<path d=\"";
    let mut first = true;
    for y in 0..qr.size() {
        for x in 0..qr.size() {
            if qr.get_module(x, y) {
                if !first {
                    result += " ";
                }
                first = false;
                result += &format!("M{},{}h1v1h-1z", x + border, y + border);
            }
        }
    }
    result += &format!("\" fill=\"{}\"/>\n", options.colors.foreground);
    result += "</svg>\n";
    result
}

/// Renders the code with block characters for terminal preview.
pub fn to_terminal_string(qr: &QrMatrix, border: i32) -> String {
    let mut out = String::new();
    for y in -border..qr.size() + border {
        for x in -border..qr.size() + border {
            let c = if qr.get_module(x, y) { '█' } else { ' ' };
            out.push(c);
            out.push(c);
        }
        out.push('\n');
    }
    out
}

/// Prints the given QR code to the console.
pub fn print_qr(qr: &QrMatrix) {
    println!("{}", to_terminal_string(qr, 4));
}

/// Saves an image as PNG.
///
/// # Arguments
///
/// * `img` - The rendered code.
/// * `directory_path` - Optional. Defaults to "generated"; created when missing.
/// * `filename` - Optional. A timestamp-based name is used when absent. `.png` is appended
///   when the name has no extension.
///
/// # Returns
///
/// The path of the written file.
pub fn save_png(
    img: &RgbaImage,
    directory_path: Option<&Path>,
    filename: Option<&str>,
) -> Result<PathBuf> {
    let directory_path = directory_path.unwrap_or_else(|| Path::new("generated"));
    let filename = match filename {
        Some(name) if Path::new(name).extension().is_some() => name.to_string(),
        Some(name) => format!("{name}.png"),
        None => format!("qr_{}.png", chrono::Utc::now().timestamp_millis()),
    };

    if !directory_path.exists() {
        fs::create_dir_all(directory_path)?;
    }

    let file_path = directory_path.join(filename);
    img.save_with_format(&file_path, ImageFormat::Png)?;
    debug!(path = %file_path.display(), "saved QR image");
    Ok(file_path)
}

// Tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::colors::Rgb;

    fn sample() -> QrMatrix {
        encode("HELLO WORLD", EccLevel::L).unwrap()
    }

    #[test]
    fn test_encode_small_text_is_version_one() {
        let qr = sample();
        assert_eq!(qr.size(), 21);
        assert_eq!(qr.version(), 1);
        assert_eq!(qr.ecc(), EccLevel::L);
        // Top-left finder pattern corner is dark; outside is light
        assert!(qr.get_module(0, 0));
        assert!(!qr.get_module(-1, 0));
        assert!(!qr.get_module(21, 21));
    }

    #[test]
    fn test_encode_rejects_oversized_content() {
        let content = "x".repeat(3000);
        assert!(matches!(encode(&content, EccLevel::H), Err(Error::DataTooLong(3000))));
    }

    #[test]
    fn test_to_svg_string() {
        let svg = to_svg_string(&sample(), &RenderOptions::default());
        assert!(svg.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(svg.contains("viewBox=\"0 0 29 29\""));
        assert!(svg.contains("fill=\"#000000\""));
        assert!(svg.contains("fill=\"#FFFFFF\""));
    }

    #[test]
    fn test_image_uses_requested_width_and_colors() {
        let options = RenderOptions {
            width: 290,
            colors: QrColors {
                foreground: Rgb::new(0x0B, 0x4F, 0x8A),
                background: Rgb::WHITE,
            },
            ..Default::default()
        };
        let img = to_image(&sample(), &options);
        assert_eq!(img.dimensions(), (290, 290));
        // Quiet zone is background, finder corner is foreground (10 px per module)
        assert_eq!(img.get_pixel(5, 5).0, [255, 255, 255, 255]);
        assert_eq!(img.get_pixel(45, 45).0, [0x0B, 0x4F, 0x8A, 255]);
    }

    #[test]
    fn test_small_width_falls_back_to_one_pixel_per_module() {
        let options = RenderOptions {
            width: 10,
            margin: 2,
            ..Default::default()
        };
        let img = to_image(&sample(), &options);
        assert_eq!(img.dimensions(), (25, 25));
    }

    #[test]
    fn test_data_url() {
        let img = to_image(&sample(), &RenderOptions::default());
        let url = to_data_url(&img).unwrap();
        assert!(url.starts_with("data:image/png;base64,iVBORw0KGgo"));
    }

    #[test]
    fn test_terminal_string() {
        let text = to_terminal_string(&sample(), 1);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 23);
        assert_eq!(lines[0].chars().count(), 46);
    }

    #[test]
    fn test_save_png_appends_extension() {
        let dir = tempfile::tempdir().unwrap();
        let img = to_image(&sample(), &RenderOptions::default());
        let path = save_png(&img, Some(dir.path()), Some("hello")).unwrap();
        assert_eq!(path.file_name().unwrap(), "hello.png");
        assert!(path.exists());
    }
}
