//! End-to-end tests for vocabulary training and quantization.

use vocabtree::{
    CentersInit, Dataset, DenseDataset, RealL2, VocabError, VocabTreeParams, VocabTreeReal,
};

/// Eight 2-d points forming two tight clusters of four.
fn two_cluster_data() -> DenseDataset<RealL2> {
    DenseDataset::from_rows(&[
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
        vec![10.0, 10.0],
        vec![10.0, 11.0],
        vec![11.0, 10.0],
        vec![11.0, 11.0],
    ])
    .unwrap()
}

#[test]
fn two_clusters_split_into_four_words() {
    let data = two_cluster_data();
    let mut tree = VocabTreeReal::new(VocabTreeParams {
        branching: 2,
        depth: 2,
        centers_init: CentersInit::KmeansPp,
        seed: 0,
        ..Default::default()
    });
    tree.build(&data).unwrap();

    assert_eq!(tree.num_words(), 4);
    assert_eq!(tree.num_nodes(), 7);
    assert_eq!(tree.veclen(), 2);

    // The root splits the near and far clusters four against four.
    let mut branch_counts = [0usize; 2];
    for i in 0..8 {
        let q = tree.quantize(data.row(i), 0).unwrap();
        branch_counts[q.node_at_level as usize] += 1;
    }
    assert_eq!(branch_counts, [4, 4]);
}

#[test]
fn branching_below_two_is_rejected() {
    let data = two_cluster_data();
    let mut tree = VocabTreeReal::new(VocabTreeParams {
        branching: 1,
        ..Default::default()
    });
    assert!(matches!(
        tree.build(&data),
        Err(VocabError::InvalidParam(_))
    ));
}

#[test]
fn zero_depth_is_rejected() {
    let data = two_cluster_data();
    let mut tree = VocabTreeReal::new(VocabTreeParams {
        depth: 0,
        ..Default::default()
    });
    assert!(matches!(
        tree.build(&data),
        Err(VocabError::InvalidParam(_))
    ));
}

#[test]
fn empty_dataset_is_rejected() {
    let data = DenseDataset::<RealL2>::from_rows(&[]).unwrap();
    let mut tree = VocabTreeReal::new(VocabTreeParams::default());
    assert!(matches!(tree.build(&data), Err(VocabError::EmptyDataset)));
}

#[test]
fn every_descriptor_lands_in_exactly_one_word() {
    let data = two_cluster_data();
    for init in [CentersInit::Random, CentersInit::Gonzales, CentersInit::KmeansPp] {
        let mut tree = VocabTreeReal::new(VocabTreeParams {
            branching: 2,
            depth: 3,
            centers_init: init,
            seed: 42,
            ..Default::default()
        });
        tree.build(&data).unwrap();

        let mut counts = vec![0usize; tree.num_words()];
        for i in 0..data.rows() {
            let q = tree.quantize(data.row(i), 0).unwrap();
            counts[q.word_id as usize] += 1;
        }
        assert_eq!(counts.iter().sum::<usize>(), data.rows());
    }
}

#[test]
fn equal_seeds_build_equal_trees() {
    let data = two_cluster_data();
    for init in [CentersInit::Random, CentersInit::Gonzales, CentersInit::KmeansPp] {
        let params = VocabTreeParams {
            branching: 3,
            depth: 2,
            centers_init: init,
            seed: 1234,
            ..Default::default()
        };
        let mut a = VocabTreeReal::new(params);
        let mut b = VocabTreeReal::new(params);
        a.build(&data).unwrap();
        b.build(&data).unwrap();
        assert_eq!(a, b, "{init:?} build must be reproducible");
    }
}

#[test]
fn three_distinct_points_fill_all_three_children() {
    // Ten copies of one point plus two other distinct points: every child
    // of the root must still end up with members.
    let mut rows = vec![vec![0.0, 0.0]; 10];
    rows.push(vec![5.0, 5.0]);
    rows.push(vec![9.0, 0.0]);
    let data = DenseDataset::<RealL2>::from_rows(&rows).unwrap();

    for init in [CentersInit::Random, CentersInit::Gonzales, CentersInit::KmeansPp] {
        let mut tree = VocabTreeReal::new(VocabTreeParams {
            branching: 3,
            depth: 1,
            centers_init: init,
            seed: 7,
            ..Default::default()
        });
        tree.build(&data).unwrap();
        assert_eq!(tree.num_words(), 3);

        let mut counts = vec![0usize; 3];
        for i in 0..data.rows() {
            let q = tree.quantize(data.row(i), 0).unwrap();
            counts[q.word_id as usize] += 1;
        }
        assert!(
            counts.iter().all(|&c| c > 0),
            "{init:?} left an empty word: {counts:?}"
        );
    }
}

#[test]
fn word_centers_quantize_to_their_own_word() {
    let data = two_cluster_data();
    let mut tree = VocabTreeReal::new(VocabTreeParams {
        branching: 2,
        depth: 2,
        centers_init: CentersInit::KmeansPp,
        seed: 0,
        ..Default::default()
    });
    tree.build(&data).unwrap();

    for word in 0..tree.num_words() as u32 {
        let center = tree.word_center(word).unwrap().to_vec();
        let q = tree.quantize(&center, 0).unwrap();
        assert_eq!(q.word_id, word);
    }
}

#[test]
fn small_partitions_seal_early_leaves() {
    // Three points under branching 4: the root itself becomes the only word.
    let data = DenseDataset::<RealL2>::from_rows(&[
        vec![0.0, 0.0],
        vec![1.0, 1.0],
        vec![2.0, 2.0],
    ])
    .unwrap();
    let mut tree = VocabTreeReal::new(VocabTreeParams {
        branching: 4,
        depth: 3,
        ..Default::default()
    });
    tree.build(&data).unwrap();
    assert_eq!(tree.num_words(), 1);
    assert_eq!(tree.num_nodes(), 1);
    assert_eq!(tree.quantize(&[5.0, 5.0], 0).unwrap().word_id, 0);
}

#[test]
fn uncapped_iterations_still_terminate() {
    let data = two_cluster_data();
    let mut tree = VocabTreeReal::new(VocabTreeParams {
        branching: 2,
        depth: 2,
        max_iterations: -1,
        ..Default::default()
    });
    tree.build(&data).unwrap();
    assert_eq!(tree.num_words(), 4);
}
