//! Fabric Ordering Properties
//!
//! Frames between one source and one destination must arrive in send order,
//! no matter how sends from different sources interleave.

use bytes::Bytes;
use proptest::prelude::*;
use std::collections::HashMap;
use transport::{FabricConfig, InProcessFabric, Rank, Transport};

const WORLD_SIZE: usize = 3;

prop_compose! {
    fn send_plan()
        (sends in prop::collection::vec((0u32..WORLD_SIZE as u32, 0u32..WORLD_SIZE as u32), 1..64))
        -> Vec<(Rank, Rank)> {
        sends
            .into_iter()
            .map(|(from, to)| (Rank::new(from), Rank::new(to)))
            .collect()
    }
}

proptest! {
    #[test]
    fn per_pair_order_is_preserved(plan in send_plan()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let fabric = InProcessFabric::new(WORLD_SIZE, FabricConfig::default());
            let endpoints = fabric.into_endpoints();

            let mut expected: HashMap<(Rank, Rank), Vec<u32>> = HashMap::new();
            for (seq, (from, to)) in plan.iter().enumerate() {
                let seq = seq as u32;
                endpoints[from.index()]
                    .send(*to, Bytes::copy_from_slice(&seq.to_le_bytes()))
                    .unwrap();
                expected.entry((*from, *to)).or_default().push(seq);
            }

            let mut observed: HashMap<(Rank, Rank), Vec<u32>> = HashMap::new();
            for endpoint in &endpoints {
                let to = endpoint.local_rank();
                let pending: usize = expected
                    .iter()
                    .filter(|((_, dest), _)| *dest == to)
                    .map(|(_, seqs)| seqs.len())
                    .sum();
                for _ in 0..pending {
                    let received = endpoint.receive().await.unwrap().unwrap();
                    let seq = u32::from_le_bytes(received.bytes[..4].try_into().unwrap());
                    observed.entry((received.from, to)).or_default().push(seq);
                }
            }

            assert_eq!(observed, expected);
        });
    }
}

#[tokio::test]
async fn endpoints_report_their_rank() {
    let fabric = InProcessFabric::new(4, FabricConfig::default());
    assert_eq!(fabric.world_size(), 4);

    for rank in Rank::all(4) {
        let endpoint = fabric.endpoint(rank).unwrap();
        assert_eq!(endpoint.local_rank(), rank);
        assert_eq!(endpoint.world_size(), 4);
        assert!(endpoint.is_valid_rank(Rank::new(3)));
        assert!(!endpoint.is_valid_rank(Rank::new(4)));
    }
    assert!(fabric.endpoint(Rank::new(4)).is_none());
}
