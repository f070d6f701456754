use stackarena::{
    ArenaError, ArenaState, ClosePolicy, Kernel, Position, StackArena, StackConfig,
    TrackingSource,
};

#[test]
fn child_overflow_moves_parent_to_next_block() {
    let mut root = StackArena::bounded_with_block_size(1024, 256).unwrap();
    let a = root.allocate(100, 1).unwrap();
    assert_eq!(root.position(), Position { block: 0, offset: 100 });

    let mut child = root.push().unwrap();
    let b = child.allocate(100, 1).unwrap();
    assert_eq!(b.address(), a.address() + 100);
    assert_eq!(child.position(), Position { block: 0, offset: 200 });

    // 200 + 100 > 256: the slice comes from a fresh block.
    child.allocate(100, 1).unwrap();
    assert_eq!(child.position(), Position { block: 1, offset: 100 });
    assert_eq!(root.block_count(), 2);

    child.close().unwrap();
    assert_eq!(root.state(), ArenaState::Top);
    // Not rewound to offset 100 of block 0.
    assert_eq!(root.position(), Position { block: 1, offset: 100 });

    root.close().unwrap();
}

#[test]
fn single_block_capacity_is_exhausted() {
    let arena = StackArena::bounded_with_block_size(100, 100).unwrap();
    arena.allocate(50, 1).unwrap();
    let err = arena.allocate(60, 1).unwrap_err();
    assert!(matches!(err, ArenaError::CapacityExceeded { .. }));
    assert!(err.is_exhaustion());
}

#[test]
fn oversized_request_is_rejected() {
    let arena = StackArena::unbounded(256).unwrap();
    arena.allocate(10, 1).unwrap();
    assert_eq!(
        arena.allocate(257, 1).unwrap_err(),
        ArenaError::AllocationTooLarge {
            size: 257,
            alignment: 1,
            block_size: 256
        }
    );
}

#[test]
fn invalid_alignment_is_rejected() {
    let arena = StackArena::new().unwrap();
    for alignment in [0, 3, 6, 12, 100] {
        assert_eq!(
            arena.allocate(8, alignment).unwrap_err(),
            ArenaError::InvalidAlignment { alignment }
        );
    }
}

#[test]
fn zero_sized_allocation_is_aligned() {
    let arena = StackArena::new().unwrap();
    arena.allocate(3, 1).unwrap();
    let empty = arena.allocate(0, 64).unwrap();
    assert!(empty.is_empty());
    assert_eq!(empty.address() % 64, 0);
}

#[test]
fn parent_is_locked_until_child_closes() {
    let mut root = StackArena::new().unwrap();
    let mut child = root.push().unwrap();

    assert_eq!(root.allocate(1, 1).unwrap_err(), ArenaError::IllegalNesting);
    assert_eq!(root.push().unwrap_err(), ArenaError::IllegalNesting);
    assert_eq!(root.close(), Err(ArenaError::IllegalNesting));

    child.close().unwrap();
    root.allocate(1, 1).unwrap();
    let mut again = root.push().unwrap();
    again.close().unwrap();
    root.close().unwrap();
}

#[test]
fn root_close_invalidates_every_segment() {
    let source = TrackingSource::new(Kernel);
    let stats = source.stats();
    let mut root = StackArena::with_config_in(StackConfig::unbounded(128).with_capacity(512), source).unwrap();

    let outer = root.allocate(64, 8).unwrap();
    let mut child = root.push().unwrap();
    let inner = child.allocate(64, 8).unwrap();
    inner.write(0, b"scratch").unwrap();
    child.close().unwrap();

    outer.write(0, b"kept").unwrap();
    let mut buf = [0u8; 4];
    outer.read(0, &mut buf).unwrap();
    assert_eq!(&buf, b"kept");

    root.close().unwrap();
    assert_eq!(outer.read(0, &mut buf), Err(ArenaError::AlreadyClosed));
    assert_eq!(inner.to_vec(), Err(ArenaError::AlreadyClosed));
    assert_eq!(stats.live_bytes(), 0);
    assert!(stats.reserved_bytes() <= root.capacity());
}

#[test]
fn rewind_policy_reuses_child_memory() {
    let config = StackConfig::bounded(256).with_close_policy(ClosePolicy::Rewind);
    let mut root = StackArena::with_config(config).unwrap();

    // Without recycling this loop would need 100 * 200 bytes.
    for _ in 0..100 {
        let mut local = root.push().unwrap();
        local.allocate(200, 8).unwrap();
        local.close().unwrap();
    }
    assert_eq!(root.block_count(), 1);
    root.close().unwrap();
}

#[test]
fn session_is_observable_but_owned_by_arena() {
    let mut root = StackArena::new().unwrap();
    let session = root.session().clone();
    let segment = root.allocate(8, 8).unwrap();
    assert!(segment.session().same_as(&session));

    let child = root.push().unwrap();
    assert!(!child.session().same_as(&session));
    drop(child);

    assert!(session.is_alive());
    root.close().unwrap();
    assert!(!session.is_alive());
}
