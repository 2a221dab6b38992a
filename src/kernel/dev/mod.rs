// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Devices
//!
//! Kernel facilities the server drives on behalf of its clients.

pub mod inproc;
