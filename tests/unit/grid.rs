//! Unit tests for grid enumeration

use labour_force_fetcher::grid::Grid;
use std::collections::HashSet;

#[test]
fn test_full_grid_order_and_size() {
    let grid = Grid::labour_force();
    let combinations: Vec<_> = grid.combinations().collect();

    assert_eq!(combinations.len(), 1620);
    assert_eq!(
        combinations[0].key(),
        "AUSTRALIA_CIVILIAN_POPULATION_15_AND_OVER_MALES_ORIGINAL"
    );
    assert_eq!(
        combinations[1].key(),
        "AUSTRALIA_CIVILIAN_POPULATION_15_AND_OVER_MALES_SEASONALLY_ADJUSTED"
    );
    assert_eq!(
        combinations[3].key(),
        "AUSTRALIA_CIVILIAN_POPULATION_15_AND_OVER_FEMALES_ORIGINAL"
    );
    assert_eq!(
        combinations[1619].key(),
        "AUSTRALIAN_CAPITAL_TERRITORY_PART_TIME_EMPLOYED_MONTHLY_HOURS_WORKED_IN_ALL_JOBS_15_AND_OVER_PERSONS_TREND"
    );

    let keys: HashSet<String> = combinations.iter().map(|c| c.key()).collect();
    assert_eq!(keys.len(), 1620);
}

#[test]
fn test_enumeration_is_repeatable() {
    let grid = Grid::new(&["A", "B"], &["X", "Y", "Z"], &["AGE"], &["M", "F"], &["O"]);
    let first: Vec<String> = grid.combinations().map(|c| c.key()).collect();
    let second: Vec<String> = grid.combinations().map(|c| c.key()).collect();

    assert_eq!(first, second);
    assert_eq!(grid.combinations().len(), 12);
    assert_eq!(first[0], "A_X_AGE_M_O");
    assert_eq!(first[1], "A_X_AGE_F_O");
    assert_eq!(first[2], "A_Y_AGE_M_O");
    assert_eq!(first[11], "B_Z_AGE_F_O");
}

#[test]
fn test_empty_dimension_yields_nothing() {
    let grid = Grid::new(&["A"], &[], &["AGE"], &["P"], &["O"]);
    assert!(grid.is_empty());
    assert_eq!(grid.combinations().count(), 0);
}
