use crate::volume::Volume;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array3;
use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

const HEADER_LEN: u64 = 1024;
const MAP_TAG: &[u8; 4] = b"MAP ";
const MODE_I8: i32 = 0;
const MODE_I16: i32 = 1;
const MODE_F32: i32 = 2;
const MODE_U16: i32 = 6;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("Invalid MRC header in {path}: {reason}")]
    InvalidHeader { path: PathBuf, reason: String },

    #[error("Unsupported MRC mode {mode} in {path}")]
    UnsupportedMode { path: PathBuf, mode: i32 },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl VolumeLoaderError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Fields of the MRC2014 header this crate reads or writes.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MrcHeader {
    nx: usize,
    ny: usize,
    nz: usize,
    mode: i32,
    cell_x: f32,
    mx: usize,
    extended_len: u64,
}

impl MrcHeader {
    fn pixel_size(&self) -> f64 {
        if self.mx == 0 || self.cell_x <= 0.0 {
            1.0
        } else {
            self.cell_x as f64 / self.mx as f64
        }
    }
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from an MRC file
    ///
    /// # Arguments
    ///
    /// * `path` - MRC map, modes 0, 1, 2 and 6 are supported
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or the header is not a valid
    /// MRC header
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(VolumeLoaderError::io(path))?;
        let mut reader = BufReader::new(file);

        let mut raw_header = [0u8; HEADER_LEN as usize];
        reader
            .read_exact(&mut raw_header)
            .map_err(VolumeLoaderError::io(path))?;
        let header = Self::parse_header(path, &raw_header)?;
        debug!(path = %path.display(), ?header, "read MRC header");

        reader
            .seek(SeekFrom::Start(HEADER_LEN + header.extended_len))
            .map_err(VolumeLoaderError::io(path))?;

        let len = header.nx * header.ny * header.nz;
        let values = match header.mode {
            MODE_I8 => Self::read_values(&mut reader, len, |r| r.read_i8().map(f64::from)),
            MODE_I16 => Self::read_values(&mut reader, len, |r| {
                r.read_i16::<LittleEndian>().map(f64::from)
            }),
            MODE_F32 => Self::read_values(&mut reader, len, |r| {
                r.read_f32::<LittleEndian>().map(f64::from)
            }),
            MODE_U16 => Self::read_values(&mut reader, len, |r| {
                r.read_u16::<LittleEndian>().map(f64::from)
            }),
            mode => {
                return Err(VolumeLoaderError::UnsupportedMode {
                    path: path.to_path_buf(),
                    mode,
                });
            }
        }
        .map_err(VolumeLoaderError::io(path))?;

        let data = Array3::from_shape_vec((header.nz, header.ny, header.nx), values).map_err(|err| {
            VolumeLoaderError::InvalidHeader {
                path: path.to_path_buf(),
                reason: err.to_string(),
            }
        })?;
        Ok(Volume::new(data, header.pixel_size()))
    }

    /// Write a volume as a float32 MRC file.
    pub fn save_to_file(volume: &Volume, path: impl AsRef<Path>) -> Result<(), VolumeLoaderError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(VolumeLoaderError::io(path))?;
        let mut writer = BufWriter::new(file);
        Self::write_mrc(volume, &mut writer).map_err(VolumeLoaderError::io(path))?;
        writer.flush().map_err(VolumeLoaderError::io(path))
    }

    fn parse_header(path: &Path, raw: &[u8]) -> Result<MrcHeader, VolumeLoaderError> {
        let invalid = |reason: &str| VolumeLoaderError::InvalidHeader {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if &raw[208..212] != MAP_TAG {
            debug!(path = %path.display(), "MRC header without MAP tag");
        }
        // Byte 212 is 0x44 for little-endian files, 0x11 for big-endian ones.
        if raw[212] == 0x11 {
            return Err(invalid("big-endian files are not supported"));
        }

        let word = |index: usize| LittleEndian::read_i32(&raw[index * 4..index * 4 + 4]);
        let dims = [word(0), word(1), word(2)];
        if dims.iter().any(|&d| d <= 0) {
            return Err(invalid("non-positive dimensions"));
        }
        let extended = word(23);
        if extended < 0 {
            return Err(invalid("negative extended header length"));
        }

        Ok(MrcHeader {
            nx: dims[0] as usize,
            ny: dims[1] as usize,
            nz: dims[2] as usize,
            mode: word(3),
            mx: word(7).max(0) as usize,
            cell_x: LittleEndian::read_f32(&raw[40..44]),
            extended_len: extended as u64,
        })
    }

    fn read_values<R: Read>(
        reader: &mut R,
        len: usize,
        mut read_one: impl FnMut(&mut R) -> io::Result<f64>,
    ) -> io::Result<Vec<f64>> {
        (0..len).map(|_| read_one(reader)).collect()
    }

    fn write_mrc<W: Write>(volume: &Volume, writer: &mut W) -> io::Result<()> {
        let (nz, ny, nx) = volume.dim();
        let pixel = volume.pixel_size as f32;
        let (min, max, sum) = volume.data().iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(lo, hi, sum), &v| (lo.min(v), hi.max(v), sum + v),
        );
        let count = volume.data().len().max(1) as f64;
        let mean = sum / count;
        let variance = volume
            .data()
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / count;
        let rms = variance.sqrt();

        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        for value in [nx, ny, nz] {
            header.write_i32::<LittleEndian>(value as i32)?;
        }
        header.write_i32::<LittleEndian>(MODE_F32)?;
        // nxstart, nystart, nzstart
        for _ in 0..3 {
            header.write_i32::<LittleEndian>(0)?;
        }
        for value in [nx, ny, nz] {
            header.write_i32::<LittleEndian>(value as i32)?;
        }
        for value in [nx, ny, nz] {
            header.write_f32::<LittleEndian>(value as f32 * pixel)?;
        }
        for _ in 0..3 {
            header.write_f32::<LittleEndian>(90.0)?;
        }
        for axis in [1, 2, 3] {
            header.write_i32::<LittleEndian>(axis)?;
        }
        header.write_f32::<LittleEndian>(min as f32)?;
        header.write_f32::<LittleEndian>(max as f32)?;
        header.write_f32::<LittleEndian>(mean as f32)?;
        // ispg, nsymbt
        header.write_i32::<LittleEndian>(1)?;
        header.write_i32::<LittleEndian>(0)?;
        header.resize(104, 0);
        header.extend_from_slice(b"MRCO");
        header.write_i32::<LittleEndian>(20140)?;
        header.resize(196, 0);
        // origin
        for _ in 0..3 {
            header.write_f32::<LittleEndian>(0.0)?;
        }
        header.extend_from_slice(MAP_TAG);
        header.extend_from_slice(&[0x44, 0x44, 0x00, 0x00]);
        header.write_f32::<LittleEndian>(rms as f32)?;
        header.write_i32::<LittleEndian>(0)?;
        header.resize(HEADER_LEN as usize, 0);
        writer.write_all(&header)?;

        let mut buffer = vec![0u8; volume.data().len() * 4];
        let values: Vec<f32> = volume.data().iter().map(|&v| v as f32).collect();
        LittleEndian::write_f32_into(&values, &mut buffer);
        writer.write_all(&buffer)
    }
}
