//! Summary statistics for learning experiments.
//!
//! - [`descriptive`]: descriptive statistics for a set of values
//! - [`curve`]: pointwise statistics of learning curves from several runs
//!
//! # Examples
//!
//! ```
//! use ifdd_stats::descriptive::DescriptiveStats;
//!
//! let returns = [-12.0, -8.0, -10.0];
//! let stats = DescriptiveStats::new(returns).unwrap();
//! assert_eq!(stats.mean, -10.0);
//! ```

pub mod curve;
pub mod descriptive;
