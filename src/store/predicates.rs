/// Generates the terminal assertion methods shared by report and span assertions.
///
/// Requires the struct to have:
/// - A field named `$items_field` holding a `Vec<&'a $item_type>`
/// - `matches(&self, item)`, `build_error_message(&self)`, `format_criteria(&self)`
///   and `$format_matching(&self)` methods
macro_rules! impl_assertion_methods {
    ($items_field:ident, $item_type:ty, $plural:expr, $format_matching:ident) => {
        /// Asserts that at least one item matches all specified criteria.
        ///
        /// # Panics
        ///
        /// Panics with a descriptive message if no match is found.
        #[allow(clippy::panic)]
        #[track_caller]
        pub fn assert_exists(&self) {
            if !self.matches_any() {
                panic!("{}", self.build_error_message());
            }
        }

        /// Asserts that no items match the specified criteria.
        ///
        /// # Panics
        ///
        /// Panics if any items match the criteria.
        #[allow(clippy::panic)]
        #[track_caller]
        pub fn assert_not_exists(&self) {
            if self.matches_any() {
                panic!(
                    "Expected no {} to match, but found {} matching.\nCriteria: {}",
                    $plural,
                    self.count(),
                    self.format_criteria()
                );
            }
        }

        /// Asserts that exactly the specified number of items match.
        ///
        /// # Panics
        ///
        /// Panics if the count doesn't match.
        #[allow(clippy::panic)]
        #[track_caller]
        pub fn assert_count(&self, expected: usize) {
            let actual = self.count();
            if actual != expected {
                panic!(
                    "Expected {} matching {}, but found {}.\nCriteria: {}\n\n{}",
                    expected,
                    $plural,
                    actual,
                    self.format_criteria(),
                    self.$format_matching()
                );
            }
        }

        /// Asserts that at least the specified number of items match.
        ///
        /// # Panics
        ///
        /// Panics if fewer items match.
        #[allow(clippy::panic)]
        #[track_caller]
        pub fn assert_at_least(&self, min: usize) {
            let actual = self.count();
            if actual < min {
                panic!(
                    "Expected at least {} matching {}, but found {}.\nCriteria: {}",
                    min,
                    $plural,
                    actual,
                    self.format_criteria()
                );
            }
        }

        /// Asserts that no more than the specified number of items match.
        ///
        /// # Panics
        ///
        /// Panics if more items match.
        #[allow(clippy::panic)]
        #[track_caller]
        pub fn assert_at_most(&self, max: usize) {
            let actual = self.count();
            if actual > max {
                panic!(
                    "Expected at most {} matching {}, but found {}.\nCriteria: {}",
                    max,
                    $plural,
                    actual,
                    self.format_criteria()
                );
            }
        }

        /// Returns the number of items that match the criteria.
        #[must_use = "the count should be used"]
        pub fn count(&self) -> usize {
            self.$items_field
                .iter()
                .filter(|item| self.matches(item))
                .count()
        }

        /// Returns all items that match the criteria, in store order.
        #[must_use = "the matching items should be used"]
        pub fn get_all(&self) -> Vec<&'a $item_type> {
            self.$items_field
                .iter()
                .copied()
                .filter(|item| self.matches(item))
                .collect()
        }

        fn matches_any(&self) -> bool {
            self.$items_field.iter().any(|item| self.matches(item))
        }
    };
}

pub(crate) use impl_assertion_methods;
