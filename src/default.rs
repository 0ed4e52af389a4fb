use core::marker::PhantomData;

use crate::local::{Local, LocalAccess};
use crate::retired::Retired;

thread_local!(static LOCAL: Local = Local::new());

/// A zero-sized [`LocalAccess`] routing through an implicit thread-local
/// participant.
///
/// Contains a raw-pointer marker so guards built on it can never migrate to
/// a thread whose participant they do not belong to.
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultAccess(PhantomData<*mut ()>);

impl LocalAccess for DefaultAccess {
    #[inline]
    fn enter_critical(self) {
        LOCAL.with(|local| local.enter_critical());
    }

    #[inline]
    fn leave_critical(self) {
        LOCAL.with(|local| local.leave_critical());
    }

    #[inline]
    fn retire_record(self, retired: Retired) {
        LOCAL.with(move |local| local.retire_record(retired));
    }
}
