//! NIfTI-1 file I/O
//!
//! Reads `.nii` and `.nii.gz` volumes into [`Volume`] and writes them back as
//! single-file NIfTI-1 with float64 voxels, so written data reads back
//! unchanged. Header fields that resampling and noise injection do not
//! touch are copied from the source header.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::Array;
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::affine::{self, Quatern};
use crate::error::{Error, Result};
use crate::volume::Volume;

const HEADER_SIZE: usize = 348;
const VOX_OFFSET: usize = 352;
const DT_FLOAT64: i16 = 64;
const BITPIX_FLOAT64: i16 = 64;
/// NIFTI_XFORM_SCANNER_ANAT
const XFORM_SCANNER_ANAT: i16 = 1;

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Get header info for diagnostics
fn get_header_info(bytes: &[u8]) -> String {
    if bytes.len() < HEADER_SIZE {
        return format!("File too small ({} bytes, need at least {})", bytes.len(), HEADER_SIZE);
    }

    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);

    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

fn decode_object(bytes: &[u8]) -> std::result::Result<InMemNiftiObject, String> {
    if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes))).map_err(|e| {
            let mut decompressed = Vec::new();
            let info = if GzDecoder::new(Cursor::new(bytes)).read_to_end(&mut decompressed).is_ok() {
                get_header_info(&decompressed)
            } else {
                "Could not decompress".to_string()
            };
            format!("Failed to read gzipped NIfTI: {} ({})", e, info)
        })
    } else {
        let info = get_header_info(bytes);
        InMemNiftiObject::from_reader(Cursor::new(bytes))
            .map_err(|e| format!("Failed to read NIfTI: {} ({})", e, info))
    }
}

/// Load a NIfTI volume from bytes
///
/// Supports both .nii and .nii.gz (gzip is auto-detected). 4D images keep
/// every frame; dimensions beyond the 4th are folded into `nt`.
pub fn load_nifti(bytes: &[u8]) -> Result<Volume> {
    let obj = decode_object(bytes).map_err(Error::Nifti)?;
    let header = obj.header().clone();

    let ndim = header.dim[0] as usize;
    if ndim < 3 {
        return Err(Error::Nifti(format!("Expected at least 3D volume, got {}D", ndim)));
    }

    let affine = get_affine(&header);

    // into_ndarray applies scl_slope / scl_inter
    let array: Array<f64, _> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| Error::Nifti(format!("Failed to convert to ndarray: {}", e)))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(Error::Nifti(format!("Expected at least 3D array, got {}D", shape.len())));
    }
    let dims = (shape[0], shape[1], shape[2]);
    let nt: usize = shape[3..].iter().product();

    // Reversed axes iterate with x fastest, i.e. Fortran order
    let data: Vec<f64> = array.t().iter().copied().collect();

    Volume::with_frames(data, dims, nt.max(1), affine, header)
}

/// Get affine transformation matrix from header
///
/// sform if `sform_code > 0`, else qform if `qform_code > 0`, else a
/// diagonal built from pixdim.
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    if header.sform_code > 0 {
        let s = &header.srow_x;
        let t = &header.srow_y;
        let u = &header.srow_z;
        [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else if header.qform_code > 0 {
        affine::from_quatern(&Quatern {
            b: header.quatern_b as f64,
            c: header.quatern_c as f64,
            d: header.quatern_d as f64,
            offset: [header.quatern_x as f64, header.quatern_y as f64, header.quatern_z as f64],
            pixdim: [header.pixdim[1] as f64, header.pixdim[2] as f64, header.pixdim[3] as f64],
            qfac: if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 },
        })
    } else {
        affine::from_voxel_size((
            header.pixdim[1] as f64,
            header.pixdim[2] as f64,
            header.pixdim[3] as f64,
        ))
    }
}

fn put_i16(buf: &mut [u8], offset: usize, v: i16) {
    buf[offset..offset + 2].copy_from_slice(&v.to_le_bytes());
}

fn put_f32(buf: &mut [u8], offset: usize, v: f32) {
    buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_bytes<'a>(buf: &mut [u8], offset: usize, len: usize, src: impl IntoIterator<Item = &'a u8>) {
    for (dst, &b) in buf[offset..offset + len].iter_mut().zip(src) {
        *dst = b;
    }
}

fn dim_to_i16(n: usize) -> Result<i16> {
    i16::try_from(n).map_err(|_| Error::Nifti(format!("Dimension {} does not fit a NIfTI-1 header", n)))
}

/// Encode the 348-byte NIfTI-1 header for `volume`
///
/// Grid, data type and scaling come from the volume; descriptive fields
/// come from `volume.header`.
fn encode_header(volume: &Volume) -> Result<[u8; HEADER_SIZE]> {
    let src = &volume.header;
    let (nx, ny, nz) = volume.dims;
    let (vsx, vsy, vsz) = volume.voxel_size;
    let mut header = [0u8; HEADER_SIZE];

    header[0..4].copy_from_slice(&(HEADER_SIZE as i32).to_le_bytes());
    header[39] = src.dim_info as u8;

    let ndim = if volume.nt > 1 { 4 } else { 3 };
    let dim = [ndim, dim_to_i16(nx)?, dim_to_i16(ny)?, dim_to_i16(nz)?, dim_to_i16(volume.nt)?, 1, 1, 1];
    for (i, &d) in dim.iter().enumerate() {
        put_i16(&mut header, 40 + i * 2, d);
    }

    put_f32(&mut header, 56, src.intent_p1 as f32);
    put_f32(&mut header, 60, src.intent_p2 as f32);
    put_f32(&mut header, 64, src.intent_p3 as f32);
    put_i16(&mut header, 68, src.intent_code as i16);
    put_i16(&mut header, 70, DT_FLOAT64);
    put_i16(&mut header, 72, BITPIX_FLOAT64);
    put_i16(&mut header, 74, src.slice_start as i16);

    let quatern = affine::to_quatern(&volume.affine);
    let frame_step = if volume.nt > 1 && src.pixdim[4] > 0.0 { src.pixdim[4] as f32 } else { 1.0 };
    let pixdim: [f32; 8] = [quatern.qfac as f32, vsx as f32, vsy as f32, vsz as f32, frame_step, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        put_f32(&mut header, 76 + i * 4, p);
    }

    put_f32(&mut header, 108, VOX_OFFSET as f32);
    // Data is written already scaled
    put_f32(&mut header, 112, 1.0);
    put_f32(&mut header, 116, 0.0);
    put_i16(&mut header, 120, src.slice_end as i16);
    header[122] = src.slice_code as u8;
    header[123] = src.xyzt_units as u8;
    put_f32(&mut header, 124, src.cal_max as f32);
    put_f32(&mut header, 128, src.cal_min as f32);
    put_f32(&mut header, 132, src.slice_duration as f32);
    put_f32(&mut header, 136, src.toffset as f32);
    put_bytes(&mut header, 148, 80, src.descrip.iter());
    put_bytes(&mut header, 228, 24, src.aux_file.iter());

    let qform_code = if src.qform_code > 0 { src.qform_code as i16 } else { XFORM_SCANNER_ANAT };
    let sform_code = if src.sform_code > 0 { src.sform_code as i16 } else { XFORM_SCANNER_ANAT };
    put_i16(&mut header, 252, qform_code);
    put_i16(&mut header, 254, sform_code);
    put_f32(&mut header, 256, quatern.b as f32);
    put_f32(&mut header, 260, quatern.c as f32);
    put_f32(&mut header, 264, quatern.d as f32);
    for (i, &o) in quatern.offset.iter().enumerate() {
        put_f32(&mut header, 268 + i * 4, o as f32);
    }

    // srow_x, srow_y, srow_z
    for row in 0..3 {
        for col in 0..4 {
            put_f32(&mut header, 280 + row * 16 + col * 4, volume.affine[row * 4 + col] as f32);
        }
    }

    put_bytes(&mut header, 328, 16, src.intent_name.iter());

    // magic = "n+1\0" for NIfTI-1 single file
    header[344..348].copy_from_slice(b"n+1\0");
    Ok(header)
}

/// Save a volume as NIfTI bytes
///
/// Writes an uncompressed .nii file with float64 voxels
pub fn save_nifti(volume: &Volume) -> Result<Vec<u8>> {
    let header = encode_header(volume)?;

    let mut buffer = Vec::with_capacity(VOX_OFFSET + volume.data.len() * 8);
    buffer.extend_from_slice(&header);
    // Extension flag: 4 zero bytes = no extension
    buffer.extend_from_slice(&[0u8; 4]);
    for &val in &volume.data {
        buffer.extend_from_slice(&val.to_le_bytes());
    }

    Ok(buffer)
}

/// Save a volume as gzipped NIfTI bytes (.nii.gz)
pub fn save_nifti_gz(volume: &Volume) -> Result<Vec<u8>> {
    let uncompressed = save_nifti(volume)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&uncompressed)
        .map_err(|e| Error::Nifti(format!("Gzip compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::Nifti(format!("Gzip finish failed: {}", e)))
}

/// Read a NIfTI file from a filesystem path
///
/// A path that does not exist is reported as [`Error::MissingFile`].
pub fn read_nifti_file(path: &Path) -> Result<Volume> {
    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    load_nifti(&bytes).map_err(|e| match e {
        Error::Nifti(msg) => Error::Nifti(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Save a volume to a file
///
/// If the path ends with .nii.gz, the file is gzip compressed.
/// Otherwise it is saved as uncompressed .nii.
pub fn save_nifti_to_file(path: &Path, volume: &Volume) -> Result<()> {
    let bytes = if path.to_string_lossy().ends_with(".nii.gz") {
        save_nifti_gz(volume)?
    } else {
        save_nifti(volume)?
    };

    std::fs::write(path, &bytes).map_err(|e| Error::io(path, e))
}
