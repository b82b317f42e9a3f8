//   Copyright 2024 The PyMC Developers
//
//   Licensed under the Apache License, Version 2.0 (the "License");
//   you may not use this file except in compliance with the License.
//   You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
//   Unless required by applicable law or agreed to in writing, software
//   distributed under the License is distributed on an "AS IS" BASIS,
//   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//   See the License for the specific language governing permissions and
//   limitations under the License.
#![warn(missing_docs)]

//! bart_core is the computational core of a Bayesian Additive Regression
//! Trees (BART) fitting engine. BART approximates a function as the sum of
//! many shallow decision trees, each too weak to explain the data on its
//! own, with priors regularizing the ensemble. This crate provides the tree
//! and node data structures, the in-place observation-index partitioner the
//! trees split through, thread-parallel leaf-statistics reductions, and a
//! binary checkpoint codec for the Control, Data, Model, and State
//! aggregates. The Markov-chain proposal sampler that drives these
//! primitives lives outside the crate.

pub mod codec;
pub mod control;
pub mod data;
pub mod model;
pub mod partition;
pub mod rule;
pub mod state;
pub mod stats;
pub mod tree;
