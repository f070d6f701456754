//! Reuses one arena across short-lived bursts of allocations.

use std::alloc::Layout;

use stackarena::{ArenaError, ClosePolicy, StackArena, StackConfig};

fn log_alloc(depth: usize, addr: usize, layout: Layout) {
    println!(
        "[depth {depth}] {} bytes aligned to {} at {addr:#x}",
        layout.size(),
        layout.align()
    );
}

fn main() -> Result<(), ArenaError> {
    let config = StackConfig::default()
        .with_capacity(64 * 1024)
        .with_close_policy(ClosePolicy::Rewind);
    let mut stack = StackArena::with_config(config)?;

    let header = stack.allocate_layout(Layout::new::<u64>())?;
    header.write(0, &42u64.to_le_bytes())?;
    log_alloc(stack.depth(), header.address(), Layout::new::<u64>());

    for round in 0..3u8 {
        let mut local = stack.push()?;
        let layout = Layout::array::<u8>(100).map_err(|_| ArenaError::InvalidSize { size: 100 })?;
        let scratch = local.allocate_layout(layout)?;
        scratch.fill(round)?;
        log_alloc(local.depth(), scratch.address(), layout);
        local.close()?;
        println!("scratch still accessible after close: {}", scratch.is_alive());
    }

    println!(
        "blocks: {}, reserved: {} bytes, position: {:?}",
        stack.block_count(),
        stack.reserved_bytes(),
        stack.position()
    );

    stack.close()?;
    println!("header accessible after root close: {}", header.is_alive());
    Ok(())
}
