/* Board identification from the DMI tables exported in sysfs. */

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::model::DeviceModel;

pub const DMI_SYSPATH: &str = "/sys/class/dmi/id";

/* Vendor and board name as reported by firmware. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardId {
    pub vendor: String,
    pub name: String,
}

pub fn read_board_id(syspath: &Path) -> Result<BoardId> {
    let device = udev::Device::from_syspath(syspath)
        .with_context(|| format!("Cannot open DMI device at {:?}", syspath))?;

    let attr = |name: &str| -> Result<String> {
        let value = device
            .attribute_value(name)
            .with_context(|| format!("DMI attribute {name} missing"))?;
        Ok(value.to_string_lossy().trim().to_string())
    };

    Ok(BoardId {
        vendor: attr("board_vendor")?,
        name: attr("board_name")?,
    })
}

/* Map a board to a model. Non-AYANEO boards and unknown names are errors:
 * the daemon has nothing to drive there. */
pub fn resolve_model(board: &BoardId) -> Result<DeviceModel> {
    debug!("DMI board: {:?}", board);
    match DeviceModel::from_dmi(&board.vendor, &board.name) {
        Some(model) => {
            info!("Detected {model} ({})", board.name);
            Ok(model)
        }
        None => bail!(
            "Unsupported board '{}' from vendor '{}'",
            board.name,
            board.vendor
        ),
    }
}

/* Resolve the running machine, or a board name given on the command line. */
pub fn detect_model(board_override: Option<&str>) -> Result<DeviceModel> {
    if let Some(name) = board_override {
        return DeviceModel::from_board_name(name)
            .with_context(|| format!("Unknown board name '{name}'"));
    }
    let board = read_board_id(Path::new(DMI_SYSPATH))?;
    resolve_model(&board)
}
