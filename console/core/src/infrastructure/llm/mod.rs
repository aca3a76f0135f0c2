// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Generation Client Infrastructure - Anti-Corruption Layer Implementations
//
// Each adapter translates between the domain `GenerationClient` contract and a
// vendor API.

pub mod gemini;

pub use gemini::GeminiClient;
