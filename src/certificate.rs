//! Certificate verification and QR codes

use chrono::{DateTime, Utc};
use qrcode::{Color, QrCode};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::api::{ApiClient, Envelope, FetchError, join_segments, parse_base_url};
use crate::config::QrConfig;
use crate::records::{Certificate, Resource};

#[derive(Debug, Error)]
pub enum QrError {
    #[error("cannot encode '{0}' as a QR code: {1}")]
    Encode(String, String),

    #[error("invalid colour '{0}' (expected #rgb or #rrggbb)")]
    InvalidColor(String),

    #[error("failed to write QR code: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of looking up a certificate by its public code.
#[derive(Debug, Clone)]
pub enum Verification {
    Valid(Certificate),
    Expired(Certificate),
    Revoked(Certificate),
    NotFound,
}

impl Verification {
    /// Classify a lookup result. Only a 404 becomes `NotFound`; other
    /// failures are passed through.
    pub fn classify(
        lookup: Result<Certificate, FetchError>,
        now: DateTime<Utc>,
    ) -> Result<Self, FetchError> {
        let cert = match lookup {
            Ok(cert) => cert,
            Err(FetchError::NotFound) => return Ok(Self::NotFound),
            Err(e) => return Err(e),
        };

        Ok(if cert.revoked {
            Self::Revoked(cert)
        } else if cert.is_expired(now) {
            Self::Expired(cert)
        } else {
            Self::Valid(cert)
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Valid(_) => "VALID",
            Self::Expired(_) => "EXPIRED",
            Self::Revoked(_) => "REVOKED",
            Self::NotFound => "NOT FOUND",
        }
    }

    pub fn certificate(&self) -> Option<&Certificate> {
        match self {
            Self::Valid(c) | Self::Expired(c) | Self::Revoked(c) => Some(c),
            Self::NotFound => None,
        }
    }
}

/// Look up `code` on the server.
pub async fn verify(api: &ApiClient, code: &str) -> Result<Verification, FetchError> {
    let code = code.trim();
    if code.is_empty() {
        return Ok(Verification::NotFound);
    }

    let lookup = api
        .get_json::<Envelope<Certificate>>(&[Resource::Certificates.path(), "verify", code], &[])
        .await
        .map(|envelope| envelope.data);
    let verification = Verification::classify(lookup, Utc::now())?;
    tracing::debug!("Certificate {}: {}", code, verification.label());
    Ok(verification)
}

/// Public page where anyone can check the certificate.
pub fn verification_url(site_url: &str, code: &str) -> Result<String, FetchError> {
    let base = parse_base_url(site_url)?;
    Ok(join_segments(&base, &["verify", code.trim()])?.into())
}

fn is_hex_color(color: &str) -> bool {
    color.strip_prefix('#').is_some_and(|hex| {
        (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
    })
}

/// Render `url` as an SVG QR code.
///
/// The image is at least `size` pixels wide, with `margin` light modules
/// around the symbol on every side.
pub fn render_qr_svg(url: &str, config: &QrConfig) -> Result<String, QrError> {
    for color in [&config.foreground, &config.background] {
        if !is_hex_color(color) {
            return Err(QrError::InvalidColor(color.clone()));
        }
    }

    let code =
        QrCode::new(url.as_bytes()).map_err(|e| QrError::Encode(url.to_string(), e.to_string()))?;

    let modules = code.width() as u32;
    let span = modules + 2 * config.margin;
    let unit = config.size.div_ceil(span).max(1);
    let side = span * unit;

    let mut svg = format!(
        concat!(
            r#"<?xml version="1.0" standalone="yes"?>"#,
            r#"<svg xmlns="http://www.w3.org/2000/svg" version="1.1""#,
            r#" width="{side}" height="{side}" viewBox="0 0 {side} {side}""#,
            r#" shape-rendering="crispEdges">"#,
            r#"<rect x="0" y="0" width="{side}" height="{side}" fill="{bg}"/>"#,
            r#"<path fill="{fg}" d=""#,
        ),
        side = side,
        bg = config.background,
        fg = config.foreground,
    );
    for (i, color) in code.to_colors().into_iter().enumerate() {
        if color != Color::Dark {
            continue;
        }
        let i = i as u32;
        let x = (config.margin + i % modules) * unit;
        let y = (config.margin + i / modules) * unit;
        svg.push_str(&format!("M{x} {y}h{unit}v{unit}H{x}V{y}"));
    }
    svg.push_str(r#""/></svg>"#);
    Ok(svg)
}

/// Render and write the QR code for `url` to `path`.
pub fn save_qr_svg(url: &str, config: &QrConfig, path: &Path) -> Result<(), QrError> {
    let image = render_qr_svg(url, config)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, image)?;
    tracing::info!("Wrote QR code to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn cert(revoked: bool, expires_at: Option<DateTime<Utc>>) -> Certificate {
        Certificate {
            id: "9".to_string(),
            code: Some("JP-2024-0009".to_string()),
            revoked,
            expires_at,
            ..Default::default()
        }
    }

    #[test]
    fn test_classify() {
        let now = Utc::now();
        let v = Verification::classify(Ok(cert(false, None)), now).unwrap();
        assert_eq!(v.label(), "VALID");

        let v = Verification::classify(Ok(cert(false, Some(now - Duration::days(1)))), now)
            .unwrap();
        assert_eq!(v.label(), "EXPIRED");

        // revoked wins over expired
        let v = Verification::classify(Ok(cert(true, Some(now - Duration::days(1)))), now)
            .unwrap();
        assert_eq!(v.label(), "REVOKED");
        assert_eq!(v.certificate().map(|c| c.code_or_id()), Some("JP-2024-0009"));

        let v = Verification::classify(Err(FetchError::NotFound), now).unwrap();
        assert!(matches!(v, Verification::NotFound));
        assert!(v.certificate().is_none());

        let err = Verification::classify(Err(FetchError::Timeout), now).unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }

    #[test]
    fn test_verification_url() {
        assert_eq!(
            verification_url("https://example.org/", " ABC123 ").unwrap(),
            "https://example.org/verify/ABC123"
        );
    }

    #[test]
    fn test_verification_url_keeps_code_in_one_segment() {
        let url = verification_url("https://example.org", "ABC/../../admin?x=1").unwrap();
        assert_eq!(url, "https://example.org/verify/ABC%2F..%2F..%2Fadmin%3Fx=1");

        assert!(matches!(
            verification_url("https://example.org", ".."),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_render_qr_svg_uses_colours() {
        let config = QrConfig {
            foreground: "#112233".to_string(),
            background: "#fff".to_string(),
            ..Default::default()
        };
        let svg = render_qr_svg("https://example.org/verify/ABC", &config).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("#112233"));
        assert!(svg.contains("#fff"));
    }

    #[test]
    fn test_render_qr_margin_is_in_modules() {
        let url = "https://example.org/verify/ABC";
        let with_margin = |margin| QrConfig {
            size: 0,
            margin,
            ..Default::default()
        };

        // one pixel per module: the side is the symbol plus both margins
        let width = QrCode::new(url.as_bytes()).unwrap().width();
        let narrow = render_qr_svg(url, &with_margin(1)).unwrap();
        let wide = render_qr_svg(url, &with_margin(8)).unwrap();
        let bare = render_qr_svg(url, &with_margin(0)).unwrap();
        assert_ne!(narrow, wide);
        assert!(narrow.contains(&format!(r#"width="{}""#, width + 2)));
        assert!(wide.contains(&format!(r#"width="{}""#, width + 16)));
        assert!(bare.contains(&format!(r#"width="{}""#, width)));

        // the top-left finder pattern starts right after the margin
        assert!(wide.contains(r#"d="M8 8h1v1H8V8"#));
        assert!(bare.contains(r#"d="M0 0h1v1H0V0"#));
    }

    #[test]
    fn test_render_qr_scales_to_size() {
        let url = "https://example.org/verify/ABC";
        let config = QrConfig {
            size: 256,
            margin: 4,
            ..Default::default()
        };
        let width = QrCode::new(url.as_bytes()).unwrap().width() as u32;
        let span = width + 8;
        let unit = 256u32.div_ceil(span);
        let svg = render_qr_svg(url, &config).unwrap();
        assert!(svg.contains(&format!(r#"viewBox="0 0 {0} {0}""#, span * unit)));
        assert!(span * unit >= 256);
    }

    #[test]
    fn test_render_qr_rejects_bad_colour() {
        let config = QrConfig {
            foreground: "black".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            render_qr_svg("x", &config),
            Err(QrError::InvalidColor(c)) if c == "black"
        ));
    }

    #[test]
    fn test_save_qr_svg() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/cert.svg");
        save_qr_svg("https://example.org/verify/A", &QrConfig::default(), &path).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("<?xml"));
    }
}
