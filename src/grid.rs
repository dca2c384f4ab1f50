//! Query grid and combination enumeration
//!
//! A [`Grid`] holds the value lists of the five query dimensions. Its
//! combinations are produced lazily in a fixed nested order: region outermost,
//! then data item, age group, sex and adjustment type.

use std::fmt;

/// Regions covered by the default grid
pub const REGIONS: [&str; 9] = [
    "AUSTRALIA",
    "NEW_SOUTH_WALES",
    "VICTORIA",
    "QUEENSLAND",
    "SOUTH_AUSTRALIA",
    "WESTERN_AUSTRALIA",
    "TASMANIA",
    "NORTHERN_TERRITORY",
    "AUSTRALIAN_CAPITAL_TERRITORY",
];

/// Data items covered by the default grid
pub const DATA_ITEMS: [&str; 20] = [
    "CIVILIAN_POPULATION",
    "EMPLOYED_FULL_TIME",
    "EMPLOYED_PART_TIME",
    "EMPLOYED_PERSONS",
    "EMPLOYMENT_TO_POPULATION_RATIO",
    "UNEMPLOYED_LOOKING_FOR_FULL_TIME_WORK",
    "UNEMPLOYED_LOOKING_FOR_PART_TIME_WORK",
    "UNEMPLOYED_PERSONS",
    "LABOUR_FORCE_FULL_TIME",
    "LABOUR_FORCE_PART_TIME",
    "LABOUR_FORCE",
    "NOT_IN_THE_LABOUR_FORCE",
    "UNEMPLOYMENT_RATE_LOOKING_FOR_PART_TIME_WORK",
    "UNEMPLOYMENT_RATE_LOOKING_FOR_FULL_TIME_WORK",
    "UNEMPLOYMENT_RATE",
    "UNEMPLOYMENT_TO_POPULATION_RATIO_LOOKING_FOR_FULL_TIME_WORK",
    "PARTICIPATION_RATE",
    "EMPLOYED_PERSONS_MONTHLY_HOURS_WORKED_IN_ALL_JOBS",
    "FULL_TIME_EMPLOYED_MONTHLY_HOURS_WORKED_IN_ALL_JOBS",
    "PART_TIME_EMPLOYED_MONTHLY_HOURS_WORKED_IN_ALL_JOBS",
];

/// Age groups covered by the default grid
pub const AGE_GROUPS: [&str; 1] = ["15_AND_OVER"];

/// Sex values covered by the default grid
pub const SEX_VALUES: [&str; 3] = ["MALES", "FEMALES", "PERSONS"];

/// Adjustment types covered by the default grid
pub const ADJUSTMENT_TYPES: [&str; 3] = ["ORIGINAL", "SEASONALLY_ADJUSTED", "TREND"];

/// One point in the query grid
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Combination {
    region: String,
    data_item: String,
    age: String,
    sex: String,
    adjustment_type: String,
}

impl Combination {
    /// Create a combination from its five dimension values
    pub fn new(
        region: impl Into<String>,
        data_item: impl Into<String>,
        age: impl Into<String>,
        sex: impl Into<String>,
        adjustment_type: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            data_item: data_item.into(),
            age: age.into(),
            sex: sex.into(),
            adjustment_type: adjustment_type.into(),
        }
    }

    /// Get the region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Get the data item
    pub fn data_item(&self) -> &str {
        &self.data_item
    }

    /// Get the age group
    pub fn age(&self) -> &str {
        &self.age
    }

    /// Get the sex value
    pub fn sex(&self) -> &str {
        &self.sex
    }

    /// Get the adjustment type
    pub fn adjustment_type(&self) -> &str {
        &self.adjustment_type
    }

    /// Stable checkpoint key, e.g. `VICTORIA_LABOUR_FORCE_15_AND_OVER_PERSONS_TREND`
    pub fn key(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            self.region, self.data_item, self.age, self.sex, self.adjustment_type
        )
    }

    /// Query parameters sent to the API
    pub fn query_params(&self) -> [(&'static str, &str); 5] {
        [
            ("region", self.region.as_str()),
            ("data_item", self.data_item.as_str()),
            ("age", self.age.as_str()),
            ("sex", self.sex.as_str()),
            ("adjustment_type", self.adjustment_type.as_str()),
        ]
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.region, self.data_item, self.age, self.sex, self.adjustment_type
        )
    }
}

/// Value lists for the five query dimensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    regions: Vec<String>,
    data_items: Vec<String>,
    age_groups: Vec<String>,
    sex_values: Vec<String>,
    adjustment_types: Vec<String>,
}

impl Grid {
    /// Create a grid from explicit dimension values
    pub fn new<S: AsRef<str>>(
        regions: &[S],
        data_items: &[S],
        age_groups: &[S],
        sex_values: &[S],
        adjustment_types: &[S],
    ) -> Self {
        fn owned<S: AsRef<str>>(values: &[S]) -> Vec<String> {
            values.iter().map(|v| v.as_ref().to_string()).collect()
        }

        Self {
            regions: owned(regions),
            data_items: owned(data_items),
            age_groups: owned(age_groups),
            sex_values: owned(sex_values),
            adjustment_types: owned(adjustment_types),
        }
    }

    /// The full labour force grid (9 × 20 × 1 × 3 × 3 = 1620 combinations)
    pub fn labour_force() -> Self {
        Self::new(&REGIONS, &DATA_ITEMS, &AGE_GROUPS, &SEX_VALUES, &ADJUSTMENT_TYPES)
    }

    /// Total number of combinations
    pub fn len(&self) -> usize {
        self.regions.len()
            * self.data_items.len()
            * self.age_groups.len()
            * self.sex_values.len()
            * self.adjustment_types.len()
    }

    /// Whether any dimension is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazily enumerate all combinations in nested order
    pub fn combinations(&self) -> Combinations<'_> {
        Combinations {
            grid: self,
            index: 0,
            total: self.len(),
        }
    }

    fn combination_at(&self, index: usize) -> Combination {
        // Mixed-radix decomposition, adjustment type varying fastest.
        let mut rest = index;
        let adjustment = rest % self.adjustment_types.len();
        rest /= self.adjustment_types.len();
        let sex = rest % self.sex_values.len();
        rest /= self.sex_values.len();
        let age = rest % self.age_groups.len();
        rest /= self.age_groups.len();
        let data_item = rest % self.data_items.len();
        rest /= self.data_items.len();
        let region = rest;

        Combination::new(
            &self.regions[region],
            &self.data_items[data_item],
            &self.age_groups[age],
            &self.sex_values[sex],
            &self.adjustment_types[adjustment],
        )
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::labour_force()
    }
}

/// Iterator over the combinations of a [`Grid`]
#[derive(Debug, Clone)]
pub struct Combinations<'a> {
    grid: &'a Grid,
    index: usize,
    total: usize,
}

impl Iterator for Combinations<'_> {
    type Item = Combination;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.total {
            return None;
        }
        let combination = self.grid.combination_at(self.index);
        self.index += 1;
        Some(combination)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Combinations<'_> {}
