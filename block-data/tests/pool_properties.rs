use block_data::BlockPool;
use proptest::prelude::*;

proptest! {
    #[test]
    fn allocated_blocks_never_exceeds_soft_cap(
        block_size in 1usize..64,
        mem_limit in 1usize..4096,
        requests in prop::collection::vec(0usize..64, 0..200),
    ) {
        let pool = BlockPool::new(block_size, mem_limit).unwrap();
        let cap = pool.soft_limit_blocks();

        let mut held = Vec::new();
        for len in requests {
            let data = vec![0u8; len.min(block_size)];
            if let Some(block) = pool.try_allocate(data).unwrap() {
                held.push(block);
            }
            prop_assert!(pool.allocated_blocks() <= cap);

            if held.len() > cap {
                held.remove(0);
            }
        }
    }

    #[test]
    fn dropping_every_block_returns_pool_to_zero(
        n in 0usize..50,
    ) {
        let pool = BlockPool::new(16, 1024).unwrap();
        let blocks: Vec<_> = (0..n)
            .filter_map(|_| pool.try_allocate(vec![0u8; 4]).unwrap())
            .collect();
        drop(blocks);
        prop_assert_eq!(pool.allocated_blocks(), 0);
    }
}
