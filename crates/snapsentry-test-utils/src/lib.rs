// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Test utilities shared between the SnapSentry crates.

/// A result type useful in tests, that wraps any error implementation.
pub type Result<T = ()> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Macro for creating parametrized *synchronous* tests.
///
/// The `param_test!` macro accepts the name of an existing function, followed by a list of case
/// names and their arguments. It expands to a module with a `#[test]` function for each of the
/// cases. Each test case calls the existing, named function with their provided arguments.
///
/// See [`async_param_test`] for a similar macro that works with `async` functions.
///
/// # Examples
///
/// ```
/// # use snapsentry_test_utils::param_test;
/// #
/// param_test! {
///     test_sum: [
///         positive_sums: (10, 7, 17),
///         negative_sums: (-5, -3, -8)
///     ]
/// }
/// fn test_sum(lhs: i32, rhs: i32, sum: i32) {
///     assert_eq!(lhs + rhs, sum);
/// }
/// ```
///
/// Test functions can also have return types, such as a [`Result`]:
///
/// ```
/// # use std::error::Error;
/// # use snapsentry_test_utils::param_test;
/// #
/// param_test! {
///     test_parses -> Result<(), Box<dyn Error>>: [
///         positive: ("21", 21),
///         negative: ("-17", -17),
///     ]
/// }
/// fn test_parses(to_parse: &str, expected: i32) -> Result<(), Box<dyn Error>> {
///     assert_eq!(expected, to_parse.parse::<i32>()?);
///     Ok(())
/// }
/// ```
///
/// Finally, attributes such as `#[ignore]` may be added to individual tests:
///
/// ```
/// # use std::error::Error;
/// # use snapsentry_test_utils::param_test;
/// #
/// param_test! {
///     test_parses -> Result<(), Box<dyn Error>>: [
///         #[ignore] positive: ("21", 21),
///         negative: ("-17", -17),
///     ]
/// }
/// fn test_parses(to_parse: &str, expected: i32) -> Result<(), Box<dyn Error>> {
///     assert_eq!(expected, to_parse.parse::<i32>()?);
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! param_test {
    ($func_name:ident -> $return_ty:ty: [
        $( $(#[$outer:meta])* $case_name:ident: ( $($args:expr),* $(,)? ) ),+$(,)?
    ]) => {
        mod $func_name {
            use super::*;

            $(
                #[test]
                $(#[$outer])*
                fn $case_name() -> $return_ty {
                    $func_name($($args),*)
                }
            )*
        }
    };
    ($func_name:ident: [
        $( $(#[$outer:meta])* $case_name:ident: ( $($args:expr),* $(,)? ) ),+$(,)?
    ]) => {
        $crate::param_test!(
            $func_name -> ():
            [ $( $(#[$outer])* $case_name: ( $($args),* ) ),+ ]
        );
    };
}

/// Macro for creating parametrized *asynchronous* tests.
///
/// This macro behaves similarly to the [`param_test`] macro, however it must be used with an
/// `async` function. For convenience, the macro expands the test cases with the `#[tokio::test]`
/// attribute, unless a shared attribute is provided before the function name, in which case that
/// attribute is applied instead:
///
/// ```ignore
/// async_param_test! {
///     #[tokio::test(start_paused = true)]
///     eventually_succeeds: [
///         after_one_failure: (1),
///         after_two_failures: (2),
///     ]
/// }
/// async fn eventually_succeeds(failures: usize) { /* ... */ }
/// ```
#[macro_export]
macro_rules! async_param_test {
    ($(#[$shared:meta])+ $func_name:ident $(-> $return_ty:ty)?: [
        $( $case_name:ident: ( $($args:expr),* $(,)? ) ),+$(,)?
    ]) => {
        mod $func_name {
            use super::*;

            $crate::async_param_test_cases!{
                [$(#[$shared])+]
                $func_name $(-> $return_ty)?: [ $( $case_name: ( $($args),* ) ),+ ]
            }
        }
    };
    ($func_name:ident $(-> $return_ty:ty)?: [
        $( $case_name:ident: ( $($args:expr),* $(,)? ) ),+$(,)?
    ]) => {
        $crate::async_param_test!(
            #[tokio::test]
            $func_name $(-> $return_ty)?: [ $( $case_name: ( $($args),* ) ),+ ]
        );
    };
}

/// Internal helper for [`async_param_test`]; recursively expands one test case at a time so
/// that the shared attributes (which may repeat a different number of times than the case
/// list) can be applied to each case without a meta-variable repetition mismatch. Not part of
/// the public API.
#[doc(hidden)]
#[macro_export]
macro_rules! async_param_test_cases {
    (
        [$(#[$attr:meta])+] $func_name:ident $(-> $return_ty:ty)?: [
            $case_name:ident: ( $($args:expr),* $(,)? )
        ]
    ) => {
        $(#[$attr])+
        async fn $case_name() $(-> $return_ty)? {
            $func_name($($args),*).await
        }
    };
    (
        [$(#[$attr:meta])+] $func_name:ident $(-> $return_ty:ty)?: [
            $case_name:ident: ( $($args:expr),* $(,)? ), $($rest:tt)*
        ]
    ) => {
        $(#[$attr])+
        async fn $case_name() $(-> $return_ty)? {
            $func_name($($args),*).await
        }

        $crate::async_param_test_cases!{
            [$(#[$attr])+] $func_name $(-> $return_ty)?: [ $($rest)* ]
        }
    };
}

/// Asserts that two sequences that implement [`std::iter::IntoIterator`], and whose items
/// implement [`Ord`], are equal, irrespective of ordering.
#[macro_export]
macro_rules! assert_unordered_eq {
    ($lhs:expr, $rhs:expr) => {
        let mut lhs: Vec<_> = $lhs.into_iter().collect();
        let mut rhs: Vec<_> = $rhs.into_iter().collect();

        lhs.sort();
        rhs.sort();

        assert_eq!(lhs, rhs);
    };
}
