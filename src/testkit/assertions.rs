//! Assertion macros for `Result`-returning junifer operations.
//!
//! - [`crate::assert_result_ok!`] - assert `Ok` and extract the value
//! - [`crate::assert_result_err!`] - assert `Err` and extract the error
//! - [`crate::assert_contains_error!`] - assert the error message contains a pattern
//! - [`crate::assert_same_kinds!`] - compare the data kinds of a data object
//!
//! # Example
//!
//! ```rust
//! use junifer::{assert_contains_error, assert_result_ok};
//! use junifer::errors::DataError;
//!
//! let ok: Result<i32, DataError> = Ok(42);
//! assert_eq!(assert_result_ok!(ok), 42);
//!
//! let err: Result<i32, DataError> =
//!     Err(DataError::configuration("Mask: Foo not found."));
//! assert_contains_error!(err, "not found");
//! ```

/// Assert that a Result is Ok and extract the value.
#[macro_export]
macro_rules! assert_result_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!(
                "Expected Ok, got Err: {}\n  at {}:{}:{}",
                e,
                file!(),
                line!(),
                column!()
            ),
        }
    };
    ($result:expr, $($msg:tt)+) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!(
                "{}: Expected Ok, got Err: {}\n  at {}:{}:{}",
                format!($($msg)+),
                e,
                file!(),
                line!(),
                column!()
            ),
        }
    };
}

/// Assert that a Result is Err and extract the error.
///
/// Only the variant is reported when the result is `Ok`, so the value does
/// not need to implement `Debug`.
#[macro_export]
macro_rules! assert_result_err {
    ($result:expr) => {
        match $result {
            Ok(_) => panic!(
                "Expected Err, got Ok\n  at {}:{}:{}",
                file!(),
                line!(),
                column!()
            ),
            Err(e) => e,
        }
    };
    ($result:expr, $($msg:tt)+) => {
        match $result {
            Ok(_) => panic!(
                "{}: Expected Err, got Ok\n  at {}:{}:{}",
                format!($($msg)+),
                file!(),
                line!(),
                column!()
            ),
            Err(e) => e,
        }
    };
}

/// Assert that an error's Display output contains `pattern`; yields the error.
#[macro_export]
macro_rules! assert_contains_error {
    ($result:expr, $pattern:expr) => {{
        let err = $crate::assert_result_err!($result);
        let err_str = err.to_string();
        assert!(
            err_str.contains($pattern),
            "Error '{}' does not contain '{}'\n  at {}:{}:{}",
            err_str,
            $pattern,
            file!(),
            line!(),
            column!()
        );
        err
    }};
}

/// Assert that a data object holds exactly the given kinds.
#[macro_export]
macro_rules! assert_same_kinds {
    ($data:expr, [$($kind:expr),* $(,)?]) => {{
        let mut expected: Vec<String> = vec![$($kind.to_string()),*];
        expected.sort();
        assert_eq!(
            $data.kinds(),
            expected,
            "data kinds differ\n  at {}:{}:{}",
            file!(),
            line!(),
            column!()
        );
    }};
}

#[cfg(test)]
mod tests {
    use crate::errors::DataError;
    use crate::pipeline::data::{DataItem, DataObject};
    use crate::data::space::Space;

    #[test]
    fn test_assert_result_ok_extracts_value() {
        let result: Result<i32, DataError> = Ok(7);
        assert_eq!(assert_result_ok!(result), 7);
    }

    #[test]
    #[should_panic(expected = "Expected Ok")]
    fn test_assert_result_ok_panics_on_err() {
        let result: Result<i32, DataError> = Err(DataError::shape("bad"));
        assert_result_ok!(result);
    }

    #[test]
    fn test_assert_contains_error_returns_error() {
        let result: Result<(), DataError> = Err(DataError::configuration("Mask: x not found."));
        let err = assert_contains_error!(result, "x not found");
        assert!(matches!(err, DataError::Configuration(_)));
    }

    #[test]
    fn test_assert_same_kinds_ignores_order() {
        let mut data = DataObject::new();
        data.insert_item("T1w", DataItem::new(Space::Native));
        data.insert_item("BOLD", DataItem::new(Space::Native));
        assert_same_kinds!(data, ["T1w", "BOLD"]);
    }
}
