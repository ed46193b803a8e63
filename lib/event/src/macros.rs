/// Build a `BTreeMap<String, String>` of metric tags.
///
/// ```
/// let tags = event::tags!(
///     "cmd" => "get",
///     "db" => "db0",
/// );
/// assert_eq!(tags.len(), 2);
/// ```
#[macro_export]
macro_rules! tags {
    ( $($x:expr => $y:expr),* ) => ({
        let mut _map: std::collections::BTreeMap<String, String> = std::collections::BTreeMap::new();
        $(
            _map.insert($x.into(), $y.into());
        )*
        _map
    });
    ( $($x:expr => $y:expr,)* ) => (
        $crate::tags!{$($x => $y),*}
    );
}
