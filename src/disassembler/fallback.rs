use std::{path::Path, sync::Arc};

use crate::{
    file::physical::Physical,
    live::{LiveMember, LiveModuleRc},
    metadata::token::Token,
    Error, Result,
};

/// Resolves tokens against the raw on-disk image of a module.
///
/// Hosts plug one in through [`crate::config::TransplantConfig::with_disk_fallback`]. It is only
/// consulted when the live view reports [`crate::Error::MemberMissing`] for a token and the
/// module was loaded from a file.
pub trait ImageTokenResolver: Send + Sync {
    /// Resolve a type, method or field `token` of `module` using the mapped image bytes.
    ///
    /// # Errors
    /// Any error; it replaces the original lookup failure.
    fn resolve_token(&self, image: &[u8], module: &LiveModuleRc, token: Token)
        -> Result<LiveMember>;

    /// Blob of the stand-alone signature `token`, as used by `calli`.
    ///
    /// # Errors
    /// Any error; the default reports the token as missing.
    fn resolve_signature(
        &self,
        _image: &[u8],
        _module: &LiveModuleRc,
        token: Token,
    ) -> Result<Arc<[u8]>> {
        Err(Error::MemberMissing(token))
    }

    /// User string `token`, as used by `ldstr`.
    ///
    /// # Errors
    /// Any error; the default reports the token as missing.
    fn resolve_string(&self, _image: &[u8], _module: &LiveModuleRc, token: Token) -> Result<String> {
        Err(Error::MemberMissing(token))
    }
}

/// Maps the image of `module` at `location` and runs `lookup` for `token` over its bytes.
pub(crate) fn resolve_from_image<R>(
    module: &LiveModuleRc,
    location: &Path,
    token: Token,
    lookup: impl FnOnce(&[u8]) -> Result<R>,
) -> Result<R> {
    log::warn!(
        "token {token} missing in live module {}, reading {}",
        module.name,
        location.display()
    );
    let image = Physical::new(location)?;
    lookup(image.data())
}
