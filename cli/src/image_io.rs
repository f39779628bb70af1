// Copyright (C) 2024 Ethan Uppal. All rights reserved.

use std::path::Path;

use anyhow::{Context, Result};
use prts::Grid;

/// Decodes an image file into a program grid. Anything the codec can read is
/// accepted, as long as it is a square power-of-two raster.
pub fn load_grid(path: &Path) -> Result<Grid> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode image {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Grid::from_rgba(width, height, image.into_raw()).with_context(|| {
        format!("{} is not a program image", path.display())
    })
}

/// Writes `grid` as an RGBA PNG of its own side.
pub fn save_grid(grid: Grid, path: &Path) -> Result<()> {
    let side = grid.side();
    let image = image::RgbaImage::from_raw(side, side, grid.into_rgba())
        .context("grid buffer does not match its side")?;
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("program.png");

        let grid =
            prts::assemble("LDI r1, 10\nLDI r2, 20\nADD r3, r1, r2\nHALT")
                .unwrap();
        save_grid(grid.clone(), &path).unwrap();

        let loaded = load_grid(&path).unwrap();
        assert_eq!(grid, loaded);
        assert_eq!(
            "LDI r1, 10\nLDI r2, 20\nADD r3, r1, r2\nHALT",
            prts::disassemble(&loaded).unwrap()
        );
    }

    #[test]
    fn rejects_non_square_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        image::RgbaImage::new(4, 2).save(&path).unwrap();

        let error = load_grid(&path).unwrap_err();
        assert!(error.to_string().contains("is not a program image"));
    }
}
