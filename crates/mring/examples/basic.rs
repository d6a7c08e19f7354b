//! Create a ring, look through the wrap point, decompose a record type
//! into parallel rings, and tear everything down.

use mring::{MultiRing, Ring, RingRecord};

#[derive(Debug, Clone, Copy, RingRecord)]
#[repr(C)]
struct Sample {
    x: f64,
    y: f64,
    timestamp: u64,
}

fn main() -> mring::RingResult<()> {
    let name = format!("/mring-basic-{}", std::process::id());
    let mut ring: Ring<u32> = Ring::create(&name, 1024)?;
    let l = ring.len();
    println!("created {} with capacity {l}", ring.name());

    for i in 0..l + 4 {
        ring.push(i as u32)?;
    }
    // The window spans the seam and is still one contiguous slice.
    let across = ring.slice(l - 4, l + 4)?;
    println!("window across the wrap point: {across:?}");
    ring.close()?;

    let name = format!("/mring-basic-samples-{}", std::process::id());
    let mut samples: MultiRing<Sample> = MultiRing::create(&name, 1000)?;
    samples.push_columns(SampleSlice {
        x: &[1.0, 2.0, 3.0],
        y: &[4.0, 5.0, 6.0],
        timestamp: &[100, 101, 102],
    })?;

    let window = samples.slice_from_tail(3)?;
    println!(
        "columns: x = {:?}, y = {:?}, timestamp = {:?}",
        window.x, window.y, window.timestamp
    );
    samples.close()?;
    Ok(())
}
