//! Overlay INI values onto [`RasterConfig`] defaults.

use ini::Ini;

use super::file::ConfigFileError;
use super::settings::RasterConfig;
use super::size::parse_size;

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse `WxH` (or a single number for square blocks) into block extents.
pub(super) fn parse_block_size(value: &str) -> Option<(i32, i32)> {
    let value = value.trim().to_ascii_lowercase();
    let (w, h): (i32, i32) = match value.split_once('x') {
        Some((w, h)) => (w.trim().parse().ok()?, h.trim().parse().ok()?),
        None => {
            let side: i32 = value.parse().ok()?;
            (side, side)
        }
    };
    if w < 0 || h < 0 {
        return None;
    }
    Some((w, h))
}

/// Start from defaults and apply every recognised key found in `ini`.
pub(super) fn parse_ini(ini: &Ini) -> Result<RasterConfig, ConfigFileError> {
    let mut config = RasterConfig::default();

    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("max_size") {
            let size = parse_size(v).map_err(|_| {
                invalid("cache", "max_size", v, "expected a size like '512MB' or '2GB'")
            })?;
            if size == 0 {
                return Err(invalid("cache", "max_size", v, "must be greater than zero"));
            }
            config.cache.max_size = size;
        }
    }

    if let Some(section) = ini.section(Some("raster")) {
        if let Some(v) = section.get("block_size") {
            let (w, h) = parse_block_size(v).ok_or_else(|| {
                invalid("raster", "block_size", v, "expected WIDTHxHEIGHT like '256x256'")
            })?;
            config.raster.block_cols = w;
            config.raster.block_rows = h;
        }
        if let Some(v) = section.get("threads") {
            config.raster.threads = v
                .trim()
                .parse()
                .map_err(|_| invalid("raster", "threads", v, "expected a non-negative integer"))?;
        }
    }

    Ok(config)
}
