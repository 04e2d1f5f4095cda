use patterns_bag::BagOfPatterns;

const MIT_LIKE: &str = "permission is hereby granted free of charge to any person obtaining a copy of this software";
const APACHE_LIKE: &str = "licensed under the apache license version two you may not use this file except in compliance";
const GPL_LIKE: &str = "this program is free software you can redistribute it and or modify it under the terms of the gnu general public license";

#[test]
fn nearest_pattern_for_near_verbatim_text() {
    let mut bag = BagOfPatterns::new();
    bag.set_patterns(&[(1, MIT_LIKE), (2, APACHE_LIKE), (3, GPL_LIKE)]);

    let top = bag.best_for(
        "Permission is hereby granted, free of charge, to any person obtaining a copy",
        1,
    );
    assert_eq!(top[0].pattern_id, 1);
}

#[test]
fn unrelated_text_still_returns_a_ranked_list() {
    let mut bag = BagOfPatterns::new();
    bag.set_patterns(&[(1, MIT_LIKE), (2, APACHE_LIKE), (3, GPL_LIKE)]);

    let top = bag.best_for("the quick brown fox jumps over the lazy dog", 3);
    assert_eq!(top.len(), 3);
    for pair in top.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn display_score_is_bounded_for_self_similarity() {
    let mut bag = BagOfPatterns::new();
    bag.set_patterns(&[(1, MIT_LIKE)]);
    let top = bag.best_for(MIT_LIKE, 1);
    assert_eq!(top[0].pattern_id, 1);
    assert!(top[0].display_score > 0.0);
}
