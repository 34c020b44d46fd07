use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rand::Rng;

use tessera_tiles::*;

/// A manager which swaps almost everything out, into `dir`.
pub fn tight_manager(dir: &Path) -> Arc<TileManager> {
    Arc::new(TileManager::new(SwapConfig {
        max_tiles_in_memory: 4,
        eviction_batch_size: 2,
        max_pools: 1,
        tiles_per_pool: 8,
        swap_dir: Some(dir.to_path_buf()),
        swap_enabled: true,
    }))
}

pub type Model = HashMap<(i32, i32), Vec<u8>>;

/// Scribble over random pixels and small rects, remembering what went where.
pub fn scribble(
    grid: &mut TiledDataManager,
    model: &mut Model,
    rng: &mut impl Rng,
    rounds: usize,
) -> anyhow::Result<()> {
    let ps = grid.pixel_size();
    for _ in 0..rounds {
        let x = rng.gen_range(-300..300);
        let y = rng.gen_range(-300..300);

        if rng.gen_bool(0.7) {
            let pixel: Vec<u8> = (0..ps).map(|_| rng.gen()).collect();
            grid.set_pixel(x, y, &pixel)?;
            model.insert((x, y), pixel);
        } else {
            let rect = PixelRect::new(x, y, rng.gen_range(1..20), rng.gen_range(1..20));
            let bytes: Vec<u8> = (0..rect.area() * ps).map(|_| rng.gen()).collect();
            grid.write_bytes(&bytes, rect)?;
            for (i, p) in bytes.chunks_exact(ps).enumerate() {
                let dx = (i % rect.width as usize) as i32;
                let dy = (i / rect.width as usize) as i32;
                model.insert((x + dx, y + dy), p.to_vec());
            }
        }
    }

    Ok(())
}

/// Check every modelled pixel, and that everything else reads as the default.
pub fn check(grid: &TiledDataManager, model: &Model, samples: &[(i32, i32)]) -> anyhow::Result<()> {
    for ((x, y), expected) in model.iter() {
        anyhow::ensure!(
            &grid.pixel(*x, *y)? == expected,
            "Pixel ({}, {}) is wrong",
            x,
            y
        );
    }
    for (x, y) in samples.iter().filter(|p| !model.contains_key(*p)) {
        anyhow::ensure!(
            grid.pixel(*x, *y)? == grid.default_pixel(),
            "Pixel ({}, {}) should be the default",
            x,
            y
        );
    }

    Ok(())
}
