/// Port used when the URL does not specify one.
pub(crate) const DEFAULT_PORT: &str = "80";

/// Origin location of a request, borrowed from the URL it was decomposed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Target<'a> {
    pub(crate) host: &'a str,
    pub(crate) port: &'a str,
    /// Path without its leading '/', possibly empty.
    pub(crate) path: &'a str,
}

impl<'a> Target<'a> {
    /// Decompose a URL whose scheme was already stripped, in the
    /// `host[:port][/path]` form.
    ///
    /// A ':' is only considered a port separator if it comes before the first
    /// '/', so that paths can contain colons.
    pub(crate) fn from(url: &'a str) -> Self {
        let (authority, path) = match url.split_once('/') {
            Some((authority, path)) => (authority, path),
            None => (url, ""),
        };
        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => (host, port),
            None => (authority, DEFAULT_PORT),
        };

        Self { host, port, path }
    }

    /// Resource to request from the origin, always starting with a single
    /// '/' added in front of the path.
    pub(crate) fn resource(&self) -> String {
        format!("/{}", self.path)
    }
}
