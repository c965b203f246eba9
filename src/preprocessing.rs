//! Preprocessing for uploaded MRI scans ahead of classification.
//! These functions target the classifier's fixed input geometry; do not
//! use them to prepare images for display (the presentation layer shows
//! the upload as-is).

use std::path::Path;

use anyhow::Context;
use image::{imageops, imageops::FilterType, RgbImage};
use log::warn;
use ndarray::{Array, Array4};

/// Upload types we accept, decided by content sniffing rather than extension.
const ACCEPTED_UPLOAD_TYPES: [imghdr::Type; 2] = [imghdr::Type::Jpeg, imghdr::Type::Png];

/// Checks that the file at `path` is an image of an accepted type.
pub fn validate_upload(path: &Path) -> anyhow::Result<imghdr::Type>
{
	let sniffed = imghdr::from_file(path)
		.with_context(|| format!("Error reading upload {:?}", path))?;

	match sniffed
	{
		Some(kind) if ACCEPTED_UPLOAD_TYPES.contains(&kind) => Ok(kind),
		Some(kind) =>
		{
			Err(anyhow::anyhow!("Unsupported upload type {:?} for {:?}. Upload a jpg, jpeg, or png scan.", kind, path))
		},
		None => Err(anyhow::anyhow!("{:?} does not appear to be an image.", path)),
	}
}

/// Loads an uploaded scan, correcting EXIF orientation if the camera or
/// export tool recorded one. Scans exported straight from imaging software
/// usually carry no EXIF block; those load as-is.
pub fn load_upload(path: &Path) -> anyhow::Result<RgbImage>
{
	validate_upload(path)?;

	let img = image::open(path)
		.with_context(|| format!("Error loading image {:?}", path))?;
	let mut rgb = img.to_rgb8();

	let orientation = exif_orientation(path);
	fix_orientation(&mut rgb, orientation);

	Ok(rgb)
}

/// Resize an upload to the classifier's expected input geometry.
pub fn resize_to_input(img: &RgbImage, (width, height): (u32, u32)) -> RgbImage
{
	imageops::resize(img, width, height, FilterType::Triangle)
}

/// Convert a resized upload to the single-image NHWC batch the classifier
/// expects, scaled to [0, 1].
pub fn image_to_model_format(img: &RgbImage) -> Array4<f32>
{
	let (width, height) = img.dimensions();
	let mut input = Array::zeros((1, height as usize, width as usize, 3));
	for (x, y, pixel) in img.enumerate_pixels()
	{
		let [r, g, b] = pixel.0;
		input[[0, y as usize, x as usize, 0]] = (r as f32) / 255.;
		input[[0, y as usize, x as usize, 1]] = (g as f32) / 255.;
		input[[0, y as usize, x as usize, 2]] = (b as f32) / 255.;
	}

	input
}

// EXIF orientation is a value 1-8; 1 means no adjustment required.
// Missing EXIF data or a read failure both mean "leave the image alone".
fn exif_orientation(path: &Path) -> u32
{
	let file = match std::fs::File::open(path)
	{
		Ok(file) => file,
		Err(_) => return 1,
	};
	let mut bufreader = std::io::BufReader::new(file);
	let exifreader = exif::Reader::new();
	let exif = match exifreader.read_from_container(&mut bufreader)
	{
		Ok(exif) => exif,
		Err(_) => return 1,
	};

	// Orientation is stored as a SHORT, but the standard recommends readers
	// accept BYTE, SHORT, or LONG for unsigned integer fields, which is what
	// Value::get_uint is for.
	match exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
	{
		Some(orientation) => orientation.value.get_uint(0).unwrap_or(1),
		None => 1,
	}
}

fn fix_orientation(image: &mut RgbImage, orientation: u32)
{
	match orientation
	{
		1 => {},
		2 => imageops::flip_horizontal_in_place(image),
		3 => imageops::rotate180_in_place(image),
		4 => imageops::flip_vertical_in_place(image),
		5 =>
		{
			*image = imageops::rotate90(image);
			imageops::flip_horizontal_in_place(image);
		},
		6 => *image = imageops::rotate90(image),
		7 =>
		{
			*image = imageops::rotate270(image);
			imageops::flip_horizontal_in_place(image);
		},
		8 => *image = imageops::rotate270(image),
		_ =>
		{
			warn!("Unsupported EXIF orientation: {}", orientation);
		}
	}
}
