use std::io;

pub fn read_u8<R: io::Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn read_u16<R: io::Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub fn read_u32<R: io::Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_u64<R: io::Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read a big-endian `i16`, used by MKV Block/SimpleBlock timecodes.
pub fn read_i16_be<R: io::Read>(r: &mut R) -> io::Result<i16> {
    let mut buf = [0; 2];
    r.read_exact(&mut buf)?;
    Ok(i16::from_be_bytes(buf))
}

pub fn read_vec<R: io::Read>(r: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_const_bytes<R: io::Read, const N: usize>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read `len` bytes and decode them as UTF-8, mapping invalid bytes to an
/// `io::Error` rather than lossily replacing them.
pub fn read_utf8<R: io::Read>(r: &mut R, len: usize) -> io::Result<String> {
    let bytes = read_vec(r, len)?;
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
