//! Whole grids pushed through the store format and through a swapping tile manager.
mod utils;

use std::io::{BufReader, BufWriter};

use anyhow::Result;
use log::*;
use rand::{Rng, SeedableRng};

use tessera_tiles::*;

use utils::*;

fn store_round_trip_impl() -> Result<()> {
    tessera_logging::log_to_stderr_for_tests();
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("grid.tiles");

    let mut grid = TiledDataManager::with_shared_manager(4, &[1, 2, 3, 4])?;
    grid.set_pixel(3, 3, &[9, 9, 9, 9])?;
    grid.set_pixel(-10, 150, &[5, 6, 7, 8])?;
    assert_eq!(grid.num_tiles(), 2);

    grid.write(BufWriter::new(std::fs::File::create(&path)?))?;
    debug!("Wrote {} bytes", std::fs::metadata(&path)?.len());

    let mut loaded = TiledDataManager::with_shared_manager(4, &[1, 2, 3, 4])?;
    loaded.read(BufReader::new(std::fs::File::open(&path)?))?;

    assert_eq!(loaded.num_tiles(), 2);
    assert_eq!(loaded.extent(), grid.extent());
    assert_eq!(loaded.extent(), PixelRect::new(-64, 0, 128, 192));
    assert_eq!(loaded.pixel(3, 3)?, vec![9, 9, 9, 9]);
    assert_eq!(loaded.pixel(-10, 150)?, vec![5, 6, 7, 8]);

    let extent = grid.extent();
    let mut expected = vec![0; extent.area() * 4];
    grid.read_bytes(&mut expected, extent)?;
    let mut got = vec![0; expected.len()];
    loaded.read_bytes(&mut got, extent)?;
    assert!(got == expected, "Loaded pixels differ");

    Ok(())
}

#[test]
fn store_round_trip() {
    let res = store_round_trip_impl();
    assert!(res.is_ok(), "{:?}", res);
}

fn malformed_stores_are_rejected_impl() -> Result<()> {
    tessera_logging::log_to_stderr_for_tests();
    let manager = std::sync::Arc::new(TileManager::new(Default::default()));
    let mut grid = TiledDataManager::new(manager, 1, &[0])?;
    grid.set_pixel(0, 0, &[42])?;

    let mut good = vec![];
    grid.write(&mut good)?;

    let mut short_count = good.clone();
    short_count[0] = b'2';
    let mut no_trailing_newline = b"1\n64,64,64,64".to_vec();
    no_trailing_newline.extend(std::iter::repeat(7).take(10));

    for stream in [&short_count[..], &no_trailing_newline[..], &b"-1\n"[..]] {
        let res = grid.read(stream);
        assert!(matches!(res, Err(Error::Parse(_))), "{:?}", res);
        assert_eq!(grid.pixel(0, 0)?, vec![42]);
        assert_eq!(grid.num_tiles(), 1);
    }

    // A store that's fine apart from trailing garbage still loads.
    let mut trailing = good.clone();
    trailing.extend_from_slice(b"whatever");
    grid.clear(PixelRect::new(0, 0, 1, 1), 0)?;
    grid.read(&trailing[..])?;
    assert_eq!(grid.pixel(0, 0)?, vec![42]);

    Ok(())
}

#[test]
fn malformed_stores_are_rejected() {
    let res = malformed_stores_are_rejected_impl();
    assert!(res.is_ok(), "{:?}", res);
}

fn swapping_is_invisible_impl() -> Result<()> {
    tessera_logging::log_to_stderr_for_tests();
    let dir = tempfile::tempdir()?;
    let manager = tight_manager(dir.path());
    let mut rng = rand::rngs::SmallRng::seed_from_u64(12345);

    let mut grid = TiledDataManager::new(manager.clone(), 3, &[10, 20, 30])?;
    let mut model = Model::new();
    scribble(&mut grid, &mut model, &mut rng, 300)?;

    let stats = manager.stats();
    info!("After scribbling: {:?}", stats);
    assert!(stats.swapped_tiles > 0);
    assert!(stats.resident_tiles <= 4 + 2);

    let samples: Vec<(i32, i32)> = (0..500)
        .map(|_| (rng.gen_range(-320..320), rng.gen_range(-320..320)))
        .collect();
    check(&grid, &model, &samples)?;

    // Undo through swapped snapshots.
    let before = model.clone();
    let memento = grid.get_memento();
    scribble(&mut grid, &mut model, &mut rng, 200)?;
    check(&grid, &model, &samples)?;

    grid.rollback(&memento)?;
    check(&grid, &before, &samples)?;
    grid.rollforward(&memento)?;
    check(&grid, &model, &samples)?;

    // And the same through the store format.
    let mut stream = vec![];
    grid.write(&mut stream)?;
    let mut copy = TiledDataManager::new(manager.clone(), 3, &[10, 20, 30])?;
    copy.read(&stream[..])?;
    check(&copy, &model, &samples)?;
    assert!(!manager.is_swap_forbidden());

    Ok(())
}

#[test]
fn swapping_is_invisible() {
    let res = swapping_is_invisible_impl();
    assert!(res.is_ok(), "{:?}", res);
}
