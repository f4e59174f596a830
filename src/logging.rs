/******************************************************************************
 * Copyright © 2021-2023 Kévin Lesénéchal <kevin.lesenechal@gmail.com>        *
 * This file is part of the Nucloid operating system.                         *
 *                                                                            *
 * Nucloid is free software; you can redistribute it and/or modify it under   *
 * the terms of the GNU General Public License as published by the Free       *
 * Software Foundation; either version 2 of the License, or (at your option)  *
 * any later version. See LICENSE file for more information.                  *
 ******************************************************************************/

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::sync::Spinlock;

static DEFAULT_LOGGER: Spinlock<Option<&'static dyn Logger>> =
    Spinlock::new(None);

static MIN_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Debug as u8);

/// A sink for the heap's log records. The kernel installs its serial or
/// screen logger through [`set_logger`]; until then every record is dropped.
pub trait Logger: Sync {
    fn log(&self, severity: Severity, args: fmt::Arguments);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &str {
        use Severity::*;

        match self {
            Debug       => "debug",
            Info        => "info",
            Notice      => "notice",
            Warning     => "warn",
            Error       => "error",
            Critical    => "critical",
        }
    }
}

/// Install the logger every record goes to.
///
/// The heap logs while [`LockedHeap`](crate::heap::locked::LockedHeap) holds
/// its lock: a logger must never allocate from the heap it reports on, or it
/// will spin forever.
pub fn set_logger(logger: &'static dyn Logger) {
    *DEFAULT_LOGGER.lock() = Some(logger);
}

/// Records below `severity` are discarded before reaching the logger.
pub fn set_min_severity(severity: Severity) {
    MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
}

/// Whether records of `severity` currently reach the logger.
pub fn is_enabled(severity: Severity) -> bool {
    severity as u8 >= MIN_SEVERITY.load(Ordering::Relaxed)
}

pub fn log(severity: Severity, args: fmt::Arguments) {
    if !is_enabled(severity) {
        return;
    }

    // The logger lock is released before calling into the logger so that a
    // logger may itself log.
    let logger = *DEFAULT_LOGGER.lock();

    if let Some(logger) = logger {
        logger.log(severity, args);
    }
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => ({
        $crate::logging::log($crate::logging::Severity::Debug, format_args!($($arg)*));
    });
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => ({
        $crate::logging::log($crate::logging::Severity::Info, format_args!($($arg)*));
    });
}

#[macro_export]
macro_rules! notice {
    ($($arg:tt)*) => ({
        $crate::logging::log($crate::logging::Severity::Notice, format_args!($($arg)*));
    });
}

#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => ({
        $crate::logging::log($crate::logging::Severity::Warning, format_args!($($arg)*));
    });
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => ({
        $crate::logging::log($crate::logging::Severity::Error, format_args!($($arg)*));
    });
}

#[macro_export]
macro_rules! critical {
    ($($arg:tt)*) => ({
        $crate::logging::log($crate::logging::Severity::Critical, format_args!($($arg)*));
    });
}


#[cfg(test)]
mod tests {
    use super::{Severity, is_enabled, set_min_severity};

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
        assert_eq!(Severity::Warning.label(), "warn");
    }

    #[test]
    fn it_filters_below_the_minimum_severity() {
        set_min_severity(Severity::Warning);
        assert!(!is_enabled(Severity::Debug));
        assert!(!is_enabled(Severity::Notice));
        assert!(is_enabled(Severity::Warning));
        assert!(is_enabled(Severity::Critical));

        set_min_severity(Severity::Debug);
        assert!(is_enabled(Severity::Debug));
    }
}
