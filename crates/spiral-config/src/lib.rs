// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Process-wide knobs that sit underneath the field realisation crates:
//! seed derivation for reproducible Gaussian draws and the tracing subscriber.

pub mod determinism;
pub mod tracing;
