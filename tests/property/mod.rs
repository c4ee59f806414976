// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module

mod interval_extraction;
mod reconciliation;
mod ring_buffer;
