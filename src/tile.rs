//! Spatial index used as a pre-filter for bounding-box queries.
//!
//! `tile` is a pure function of `(lat, lon)`: a Morton (Z-order) interleave
//! of the two coordinates, scaled into an unsigned integer range first.
//! Every implementation sharing one store must compute it identically, or
//! spatial queries silently disagree (spec §9 "Spatial index").

/// Number of bits used per axis before interleaving. 16 bits per axis
/// matches the reference server's `quad_tile` precision and keeps the
/// combined tile well within a `u64`.
const BITS_PER_AXIS: u32 = 16;

/// Maps a scaled longitude (`degrees * scale`, range roughly
/// `-1_800_000_000..=1_800_000_000`) onto the unsigned `x` axis used by
/// [`tile_for`].
fn lon_to_x(scaled_lon: i64) -> u32 {
    // Shift into a non-negative range spanning the full -180..=180 sweep,
    // then compress to BITS_PER_AXIS bits.
    let shifted = (scaled_lon as i128) + 1_800_000_000i128;
    let clamped = shifted.clamp(0, 3_600_000_000i128);
    ((clamped * ((1u64 << BITS_PER_AXIS) - 1) as i128) / 3_600_000_000i128) as u32
}

/// Maps a scaled latitude (`degrees * scale`, range roughly
/// `-900_000_000..=900_000_000`) onto the unsigned `y` axis used by
/// [`tile_for`].
fn lat_to_y(scaled_lat: i64) -> u32 {
    let shifted = (scaled_lat as i128) + 900_000_000i128;
    let clamped = shifted.clamp(0, 1_800_000_000i128);
    ((clamped * ((1u64 << BITS_PER_AXIS) - 1) as i128) / 1_800_000_000i128) as u32
}

/// Interleaves the bits of `x` and `y` (each at most `BITS_PER_AXIS` wide)
/// into a single Morton code, `y` occupying the low bit of each pair.
fn interleave(x: u32, y: u32) -> u64 {
    let mut result: u64 = 0;
    for bit in 0..BITS_PER_AXIS {
        let x_bit = ((x >> bit) & 1) as u64;
        let y_bit = ((y >> bit) & 1) as u64;
        result |= x_bit << (2 * bit + 1);
        result |= y_bit << (2 * bit);
    }
    result
}

/// Computes the Morton-interleaved tile index for a scaled `(lat, lon)`
/// pair. This is the sole, pure definition of `tile` for the whole store;
/// node creation and modification must call it whenever coordinates
/// change.
pub fn tile_for(scaled_lat: i64, scaled_lon: i64) -> u64 {
    interleave(lon_to_x(scaled_lon), lat_to_y(scaled_lat))
}

/// Rounds a decimal-degree coordinate to the store's integer scale
/// (spec §3: `tile` is a pure function of the *stored* integer
/// coordinates, which are `round(coord * scale)`).
pub fn scale_coord(value: f64, scale: i64) -> i64 {
    (value * scale as f64).round() as i64
}

/// Validates that a decimal-degree latitude is within range.
pub fn valid_lat(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat)
}

/// Validates that a decimal-degree longitude is within range.
pub fn valid_lon(lon: f64) -> bool {
    (-180.0..=180.0).contains(&lon)
}
