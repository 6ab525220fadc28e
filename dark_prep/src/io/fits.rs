//! FITS reading and writing for ramps and prepared bundles.
//!
//! Ramps are stored with `NAXIS1` = columns, `NAXIS2` = rows, `NAXIS3` =
//! groups and `NAXIS4` = integrations, so an ndarray in standard layout maps
//! onto the FITS pixel order without reordering.

use std::path::Path;

use fitsio::compat::fitsfile::FitsFile;
use fitsio::compat::hdu::FitsHdu;
use fitsio::compat::images::{ImageDescription, ImageType, ReadImage, WriteImage};
use ndarray::{Array, Array4, Axis, Dimension, Ix3, IxDyn};

use crate::error::{DarkPrepError, Result};
use crate::prep::PreparedDark;
use crate::ramp::{RampCube, RampHeader};

pub const SCI: &str = "SCI";
pub const SB_AND_REFPIX: &str = "SBANDREFPIX";
pub const ZEROFRAME: &str = "ZEROFRAME";
pub const ZERO_SB_AND_REFPIX: &str = "ZEROSBANDREFPIX";

/// Read a dark exposure: primary header, `SCI`, and the optional
/// `ZEROFRAME` and `SBANDREFPIX` extensions.
pub fn read_ramp(path: &Path) -> Result<RampCube> {
    if !path.exists() {
        return Err(DarkPrepError::MissingFile {
            what: "dark current".to_string(),
            path: path.to_path_buf(),
        });
    }
    let fptr = FitsFile::open(path)?;
    let primary = fptr.primary_hdu()?;

    let data = read_cube(&fptr, SCI)?.ok_or_else(|| {
        DarkPrepError::Shape(format!("{} has an empty SCI extension", path.display()))
    })?;
    let (nints, ngroups, _, _) = data.dim();

    let header = RampHeader {
        readpatt: required_key::<String>(&fptr, &primary, "READPATT")?,
        nframes: count_key(&fptr, &primary, "NFRAMES")?,
        nskip: count_key(&fptr, &primary, "NSKIP")?,
        ngroups,
        nints,
        detector: required_key::<String>(&fptr, &primary, "DETECTOR")?,
        instrument: required_key::<String>(&fptr, &primary, "INSTRUME")?,
        fastaxis: required_key::<i64>(&fptr, &primary, "FASTAXIS")?,
        slowaxis: required_key::<i64>(&fptr, &primary, "SLOWAXIS")?,
    };

    let cube = RampCube {
        data,
        sb_and_refpix: read_cube(&fptr, SB_AND_REFPIX)?,
        zeroframe: read_image::<Ix3>(&fptr, ZEROFRAME)?,
        header,
    };
    cube.check_invariants()?;

    log::info!(
        "Read {} ramp {:?} from {}",
        cube.header.readpatt,
        cube.data.shape(),
        path.display()
    );
    Ok(cube)
}

/// Read only the `SCI` extension of a file, as a 4-D ramp.
pub fn read_science(path: &Path) -> Result<Array4<f64>> {
    let fptr = FitsFile::open(path)?;
    read_cube(&fptr, SCI)?.ok_or_else(|| {
        DarkPrepError::Shape(format!("{} has an empty SCI extension", path.display()))
    })
}

/// Write a ramp with its header and any companion arrays.
pub fn write_ramp(cube: &RampCube, path: &Path) -> Result<()> {
    let mut fptr = FitsFile::create(path).overwrite().open()?;
    write_header(&mut fptr, &cube.header)?;

    write_image(&mut fptr, SCI, Some(&cube.data))?;
    if let Some(sb) = &cube.sb_and_refpix {
        write_image(&mut fptr, SB_AND_REFPIX, Some(sb))?;
    }
    if let Some(zero) = &cube.zeroframe {
        write_image(&mut fptr, ZEROFRAME, Some(zero))?;
    }
    fptr.flush()?;

    log::debug!("Wrote ramp {:?} to {}", cube.data.shape(), path.display());
    Ok(())
}

/// Write a prepared dark with the four image extensions in fixed order.
///
/// Absent arrays are written as zero-length images.
pub fn write_bundle(prepared: &PreparedDark, path: &Path) -> Result<()> {
    let mut fptr = FitsFile::create(path).overwrite().open()?;
    write_header(&mut fptr, &prepared.header)?;

    write_image(&mut fptr, SCI, Some(&prepared.data))?;
    write_image(&mut fptr, SB_AND_REFPIX, prepared.sb_and_refpix.as_ref())?;
    write_image(&mut fptr, ZEROFRAME, prepared.zeroframe.as_ref())?;
    write_image(&mut fptr, ZERO_SB_AND_REFPIX, prepared.zero_sb_and_refpix.as_ref())?;
    fptr.flush()?;

    log::info!("Prepared dark written to {}", path.display());
    Ok(())
}

/// Read back a bundle written by [`write_bundle`].
pub fn read_bundle(path: &Path) -> Result<PreparedDark> {
    if !path.exists() {
        return Err(DarkPrepError::MissingFile {
            what: "prepared dark".to_string(),
            path: path.to_path_buf(),
        });
    }
    let fptr = FitsFile::open(path)?;
    let primary = fptr.primary_hdu()?;

    let header = RampHeader {
        readpatt: required_key::<String>(&fptr, &primary, "READPATT")?,
        nframes: count_key(&fptr, &primary, "NFRAMES")?,
        nskip: count_key(&fptr, &primary, "NSKIP")?,
        ngroups: count_key(&fptr, &primary, "NGROUPS")?,
        nints: count_key(&fptr, &primary, "NINTS")?,
        detector: required_key::<String>(&fptr, &primary, "DETECTOR")?,
        instrument: required_key::<String>(&fptr, &primary, "INSTRUME")?,
        fastaxis: required_key::<i64>(&fptr, &primary, "FASTAXIS")?,
        slowaxis: required_key::<i64>(&fptr, &primary, "SLOWAXIS")?,
    };

    Ok(PreparedDark {
        data: read_cube(&fptr, SCI)?.ok_or_else(|| {
            DarkPrepError::Shape(format!("{} has an empty SCI extension", path.display()))
        })?,
        sb_and_refpix: read_cube(&fptr, SB_AND_REFPIX)?,
        zeroframe: read_image::<Ix3>(&fptr, ZEROFRAME)?,
        zero_sb_and_refpix: read_image::<Ix3>(&fptr, ZERO_SB_AND_REFPIX)?,
        header,
    })
}

fn write_header(fptr: &mut FitsFile, header: &RampHeader) -> Result<()> {
    let primary = fptr.primary_hdu()?;
    primary.write_key(fptr, "READPATT", &header.readpatt)?;
    primary.write_key(fptr, "NINTS", &(header.nints as i64))?;
    primary.write_key(fptr, "NGROUPS", &(header.ngroups as i64))?;
    primary.write_key(fptr, "NFRAMES", &(header.nframes as i64))?;
    primary.write_key(fptr, "NSKIP", &(header.nskip as i64))?;
    primary.write_key(fptr, "DETECTOR", &header.detector)?;
    primary.write_key(fptr, "INSTRUME", &header.instrument)?;
    primary.write_key(fptr, "SLOWAXIS", &header.slowaxis)?;
    primary.write_key(fptr, "FASTAXIS", &header.fastaxis)?;
    Ok(())
}

fn write_image<D: Dimension>(
    fptr: &mut FitsFile,
    extname: &str,
    array: Option<&Array<f64, D>>,
) -> Result<()> {
    let (dimensions, flat): (Vec<usize>, Vec<f64>) = match array {
        // FITS lists axes fastest first
        Some(array) => (
            array.shape().iter().rev().copied().collect(),
            array.iter().copied().collect(),
        ),
        None => (vec![0], Vec::new()),
    };

    let description = ImageDescription {
        data_type: ImageType::Double,
        dimensions,
    };
    let hdu = fptr.create_image(extname, &description)?;
    if !flat.is_empty() {
        f64::write_image(fptr, &hdu, &flat)?;
    }
    Ok(())
}

/// Read a 3-D or 4-D image as a ramp; a single integration gains a leading axis.
fn read_cube(fptr: &FitsFile, extname: &str) -> Result<Option<Array4<f64>>> {
    let Some(image) = read_dynamic(fptr, extname)? else {
        return Ok(None);
    };
    let image = match image.ndim() {
        3 => image.insert_axis(Axis(0)),
        _ => image,
    };
    image
        .into_dimensionality()
        .map(Some)
        .map_err(|e| DarkPrepError::Shape(format!("{extname}: {e}")))
}

fn read_image<D: Dimension>(fptr: &FitsFile, extname: &str) -> Result<Option<Array<f64, D>>> {
    read_dynamic(fptr, extname)?
        .map(|image| {
            image
                .into_dimensionality()
                .map_err(|e| DarkPrepError::Shape(format!("{extname}: {e}")))
        })
        .transpose()
}

/// Missing extensions and zero-length images both read as `None`.
fn read_dynamic(fptr: &FitsFile, extname: &str) -> Result<Option<Array<f64, IxDyn>>> {
    let Ok(hdu) = fptr.hdu(extname) else {
        return Ok(None);
    };

    let naxis = required_key::<i64>(fptr, &hdu, "NAXIS")?;
    let mut shape = (1..=naxis)
        .map(|axis| count_key(fptr, &hdu, &format!("NAXIS{axis}")))
        .collect::<Result<Vec<usize>>>()?;
    if shape.is_empty() || shape.contains(&0) {
        return Ok(None);
    }
    shape.reverse();

    let pixels = f64::read_image(fptr, &hdu)?;
    Array::from_shape_vec(IxDyn(&shape), pixels)
        .map(Some)
        .map_err(|e| DarkPrepError::Shape(format!("{extname}: {e}")))
}

fn required_key<T>(fptr: &FitsFile, hdu: &FitsHdu, key: &str) -> Result<T>
where
    T: fitsio::compat::headers::ReadsKey,
{
    hdu.read_key::<T>(fptr, key)
        .map_err(|_| DarkPrepError::MissingHeaderKey(key.to_string()))
}

fn count_key(fptr: &FitsFile, hdu: &FitsHdu, key: &str) -> Result<usize> {
    let value = required_key::<i64>(fptr, hdu, key)?;
    usize::try_from(value).map_err(|_| DarkPrepError::MissingHeaderKey(key.to_string()))
}
