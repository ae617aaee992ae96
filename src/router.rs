// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Crossbar routing - one exclusive source per destination.
//!
//! The remote router is authoritative: the local table only changes after the
//! service acknowledged a command, and is re-read from the service whenever a
//! command fails.

use crate::event::{ControlEvent, EventOutlet, EventSender};
use crate::remote::RouterService;
use fwmix_ipc::{ControlError, ReplyPolarity, GROUP_SEPARATOR};
use std::fmt;
use tracing::{debug, info, warn};

/// Default full-scale peak level of a destination meter.
pub const DEFAULT_PEAK_SCALE: i32 = 4096;

/// The exclusive selection of a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    Source(usize),
    #[default]
    Disconnected,
}

impl Selection {
    /// The selected source, if any.
    pub fn source(self) -> Option<usize> {
        match self {
            Selection::Source(s) => Some(s),
            Selection::Disconnected => None,
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Source(s) => write!(f, "source {}", s),
            Selection::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Group part of a port name ("ADAT" for "ADAT:03").
pub fn group_of(name: &str) -> &str {
    name.split_once(GROUP_SEPARATOR)
        .map(|(group, _)| group)
        .unwrap_or(name)
}

/// A routable input endpoint.
#[derive(Debug, Clone)]
pub struct Source {
    pub index: usize,
    pub name: String,
    pub group: String,
}

/// One entry of a source group.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOption {
    pub source: usize,
    pub label: String,
    pub checked: bool,
}

/// Sources sharing a group name. Options are built on first display.
#[derive(Debug, Clone)]
pub struct SourceGroup {
    pub name: String,
    members: Vec<usize>,
    options: Option<Vec<SourceOption>>,
}

impl SourceGroup {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_materialized(&self) -> bool {
        self.options.is_some()
    }

    /// Materialized options; empty until the group was opened.
    pub fn options(&self) -> &[SourceOption] {
        self.options.as_deref().unwrap_or(&[])
    }
}

/// Exclusive option group of one destination: "Disconnect" plus the source groups.
#[derive(Debug, Clone)]
pub struct SourceMenu {
    disconnect_checked: bool,
    groups: Vec<SourceGroup>,
}

impl SourceMenu {
    fn new(sources: &[Source]) -> Self {
        let mut groups: Vec<SourceGroup> = Vec::new();
        for source in sources {
            match groups.iter_mut().find(|g| g.name == source.group) {
                Some(group) => group.members.push(source.index),
                None => groups.push(SourceGroup {
                    name: source.group.clone(),
                    members: vec![source.index],
                    options: None,
                }),
            }
        }
        Self {
            disconnect_checked: false,
            groups,
        }
    }

    /// The disconnect option exists and is usable from construction on.
    pub fn disconnect_enabled(&self) -> bool {
        true
    }

    pub fn disconnect_checked(&self) -> bool {
        self.disconnect_checked
    }

    pub fn groups(&self) -> &[SourceGroup] {
        &self.groups
    }

    fn group_position(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|g| g.name == name)
    }

    /// Mark the options of every materialized group after `selection`.
    fn sync(&mut self, selection: Selection) {
        self.disconnect_checked = selection == Selection::Disconnected;
        for option in self.groups.iter_mut().filter_map(|g| g.options.as_mut()).flatten() {
            option.checked = selection == Selection::Source(option.source);
        }
    }
}

/// A routable output endpoint and its cached state.
#[derive(Debug, Clone)]
pub struct Destination {
    pub index: usize,
    pub name: String,
    pub group: String,
    selection: Selection,
    peak: i32,
    menu: SourceMenu,
}

impl Destination {
    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn peak(&self) -> i32 {
        self.peak
    }

    pub fn menu(&self) -> &SourceMenu {
        &self.menu
    }

    /// Port number after the group separator, used to place the destination in its group.
    pub fn slot(&self) -> Option<u32> {
        self.name
            .rsplit_once(GROUP_SEPARATOR)
            .and_then(|(_, n)| n.trim().parse().ok())
    }
}

/// Destination to source table of one crossbar router.
pub struct RoutingTable<S> {
    service: S,
    polarity: ReplyPolarity,
    sources: Vec<Source>,
    destinations: Vec<Destination>,
    peak_scale: i32,
    /// Held while a group's options are marked from the service state.
    initializing: bool,
    events: EventOutlet,
}

impl<S: RouterService> RoutingTable<S> {
    /// Build the table from a snapshot of the service.
    pub fn new(service: S, polarity: ReplyPolarity) -> Result<Self, ControlError> {
        let sources: Vec<Source> = service
            .source_names()?
            .into_iter()
            .enumerate()
            .map(|(index, name)| Source {
                index,
                group: group_of(&name).to_string(),
                name,
            })
            .collect();

        let names = service.destination_names()?;
        let mut slots: Vec<Option<String>> = vec![None; names.len()];
        for name in names {
            let reported = service.destination_index(&name)?;
            let slot = usize::try_from(reported)
                .ok()
                .and_then(|i| slots.get_mut(i))
                .filter(|slot| slot.is_none())
                .ok_or_else(|| {
                    ControlError::InconsistentState(format!(
                        "destination {} has index {} outside the dense range",
                        name, reported
                    ))
                })?;
            *slot = Some(name);
        }

        let menu = SourceMenu::new(&sources);
        let mut table = Self {
            service,
            polarity,
            sources,
            destinations: Vec::with_capacity(slots.len()),
            peak_scale: DEFAULT_PEAK_SCALE,
            initializing: false,
            events: EventOutlet::default(),
        };

        for (index, name) in slots.into_iter().flatten().enumerate() {
            let wire = table.service.source_for_destination(index as i32)?;
            let selection = table.selection_from_wire(wire);
            let mut menu = menu.clone();
            menu.sync(selection);
            table.destinations.push(Destination {
                index,
                group: group_of(&name).to_string(),
                name,
                selection,
                peak: 0,
                menu,
            });
        }

        info!(
            "Router has {} destinations and {} sources",
            table.destinations.len(),
            table.sources.len()
        );
        Ok(table)
    }

    pub fn set_event_sender(&mut self, tx: EventSender) {
        self.events.set_sender(tx);
    }

    pub fn set_peak_scale(&mut self, scale: i32) {
        self.peak_scale = scale.max(1);
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    pub fn destination(&self, destination: usize) -> Option<&Destination> {
        self.destinations.get(destination)
    }

    /// Destination group names in first-appearance order.
    pub fn destination_groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for dest in &self.destinations {
            if !groups.contains(&dest.group.as_str()) {
                groups.push(&dest.group);
            }
        }
        groups
    }

    /// Cached source of a destination.
    pub fn current_source(&self, destination: usize) -> Option<usize> {
        self.destinations
            .get(destination)
            .and_then(|d| d.selection.source())
    }

    /// Whether `source` is the marked option of `destination`.
    pub fn is_selected(&self, destination: usize, source: usize) -> bool {
        self.current_source(destination) == Some(source)
    }

    /// Route `source` to `destination`, replacing whatever was routed before.
    pub fn select_source(&mut self, destination: usize, source: usize) -> Result<(), ControlError> {
        let dst_name = self.destination_name(destination)?;
        let src_name = self
            .sources
            .get(source)
            .map(|s| s.name.clone())
            .ok_or_else(|| ControlError::IndexOutOfRange(format!("source {}", source)))?;

        if self.destinations[destination].selection == Selection::Source(source) {
            debug!("{} already routed from {}", dst_name, src_name);
            return Ok(());
        }

        match self.service.can_connect_named(&src_name, &dst_name) {
            Ok(true) => {}
            Ok(false) => debug!("{} -> {} reported as not connectable", src_name, dst_name),
            Err(e) => debug!("canConnectNamed({}, {}) failed: {}", src_name, dst_name, e),
        }

        debug!("Routing {} -> {}", src_name, dst_name);
        let outcome = self
            .service
            .set_connection_state_named(&src_name, &dst_name, true);
        self.finish_command(destination, outcome, Selection::Source(source))
    }

    /// Clear the source of `destination`.
    ///
    /// The active source is read from the service first; when nothing is routed no
    /// command is issued.
    pub fn disconnect(&mut self, destination: usize) -> Result<(), ControlError> {
        let dst_name = self.destination_name(destination)?;
        let wire = self
            .service
            .source_for_destination(destination as i32)
            .inspect_err(|e| warn!("Could not read the route of {}: {}", dst_name, e))?;

        match self.selection_from_wire(wire) {
            Selection::Disconnected => {
                debug!("{} is already disconnected", dst_name);
                self.set_selection(destination, Selection::Disconnected);
            }
            Selection::Source(source) => {
                let src_name = self.sources[source].name.clone();
                debug!("Disconnecting {} from {}", dst_name, src_name);
                let outcome = self
                    .service
                    .set_connection_state_named(&src_name, &dst_name, false);
                self.finish_command(destination, outcome, Selection::Disconnected)?;
            }
        }
        self.apply_peak(destination, 0);
        Ok(())
    }

    /// Re-read the selection of `destination` from the service.
    pub fn resync(&mut self, destination: usize) -> Result<Selection, ControlError> {
        self.destination_name(destination)?;
        let wire = self.service.source_for_destination(destination as i32)?;
        let selection = self.selection_from_wire(wire);
        self.set_selection(destination, selection);
        Ok(selection)
    }

    /// Display the options of `group` for `destination`, building them on first use.
    pub fn open_group(
        &mut self,
        destination: usize,
        group: &str,
    ) -> Result<&[SourceOption], ControlError> {
        self.destination_name(destination)?;
        let position = self.destinations[destination]
            .menu
            .group_position(group)
            .ok_or_else(|| ControlError::IndexOutOfRange(format!("source group {}", group)))?;

        if !self.destinations[destination].menu.groups[position].is_materialized() {
            let wire = self.service.source_for_destination(destination as i32)?;
            let selection = self.selection_from_wire(wire);

            let options: Vec<SourceOption> = self.destinations[destination].menu.groups[position]
                .members
                .iter()
                .map(|&source| SourceOption {
                    source,
                    label: self.sources[source].name.clone(),
                    checked: false,
                })
                .collect();
            debug!(
                "Building {} options of group {} for destination {}",
                options.len(),
                group,
                destination
            );
            self.destinations[destination].menu.groups[position].options = Some(options);

            self.initializing = true;
            let members = self.destinations[destination].menu.groups[position]
                .members
                .clone();
            for (slot, source) in members.into_iter().enumerate() {
                let checked = selection == Selection::Source(source);
                let changed = match self.destinations[destination].menu.groups[position]
                    .options
                    .as_mut()
                {
                    Some(options) if options[slot].checked != checked => {
                        options[slot].checked = checked;
                        true
                    }
                    _ => false,
                };
                // Marking reports a toggle just like a click would; the guard swallows it.
                if changed {
                    if let Err(e) = self.option_toggled(destination, source, checked) {
                        warn!("Toggle during refresh failed: {}", e);
                    }
                }
            }
            self.set_selection(destination, selection);
            self.initializing = false;
        }

        Ok(self.destinations[destination].menu.groups[position].options())
    }

    /// A source option of `destination` was toggled by the user.
    ///
    /// Unchecking is the exclusive group releasing the previous option and needs no
    /// command of its own.
    pub fn option_toggled(
        &mut self,
        destination: usize,
        source: usize,
        checked: bool,
    ) -> Result<(), ControlError> {
        if self.initializing {
            debug!(
                "Ignoring toggle of source {} on destination {} during refresh",
                source, destination
            );
            return Ok(());
        }
        if !checked {
            return Ok(());
        }
        self.select_source(destination, source)
    }

    /// The "Disconnect" option of `destination` was toggled by the user.
    pub fn disconnect_toggled(&mut self, destination: usize, checked: bool) -> Result<(), ControlError> {
        if self.initializing || !checked {
            return Ok(());
        }
        self.disconnect(destination)
    }

    /// Cache a polled peak level. Unknown destinations are ignored.
    pub fn apply_peak(&mut self, destination: usize, level: i32) -> bool {
        match self.destinations.get_mut(destination) {
            Some(dest) => {
                dest.peak = level;
                self.events.emit(ControlEvent::PeakUpdated { destination, level });
                true
            }
            None => {
                warn!("Peak for unknown destination {}", destination);
                false
            }
        }
    }

    /// Zero every cached peak.
    pub fn reset_peaks(&mut self) {
        for destination in 0..self.destinations.len() {
            self.apply_peak(destination, 0);
        }
    }

    pub fn peak(&self, destination: usize) -> Option<i32> {
        self.destinations.get(destination).map(|d| d.peak)
    }

    /// Peak level of `destination` as a 0.0..=1.0 meter fraction.
    pub fn peak_fraction(&self, destination: usize) -> f32 {
        self.peak(destination)
            .map(|p| (p as f32 / self.peak_scale as f32).clamp(0.0, 1.0))
            .unwrap_or(0.0)
    }

    fn destination_name(&self, destination: usize) -> Result<String, ControlError> {
        self.destinations
            .get(destination)
            .map(|d| d.name.clone())
            .ok_or_else(|| ControlError::IndexOutOfRange(format!("destination {}", destination)))
    }

    fn selection_from_wire(&self, wire: i32) -> Selection {
        match usize::try_from(wire) {
            Ok(source) if source < self.sources.len() => Selection::Source(source),
            Ok(source) => {
                warn!("Service reported unknown source {}", source);
                Selection::Disconnected
            }
            Err(_) => Selection::Disconnected,
        }
    }

    fn set_selection(&mut self, destination: usize, selection: Selection) {
        let dest = &mut self.destinations[destination];
        if dest.selection == selection {
            return;
        }
        debug!("{}: {} -> {}", dest.name, dest.selection, selection);
        dest.selection = selection;
        dest.menu.sync(selection);
        self.events.emit(ControlEvent::SelectionChanged {
            destination,
            selection,
        });
    }

    /// Apply `target` when the service acknowledged, otherwise resync and report.
    fn finish_command(
        &mut self,
        destination: usize,
        outcome: Result<bool, ControlError>,
        target: Selection,
    ) -> Result<(), ControlError> {
        let err = match outcome {
            Ok(reply) if self.polarity.succeeded(reply) => {
                self.set_selection(destination, target);
                return Ok(());
            }
            Ok(_) => ControlError::CommandRejected(format!(
                "{} for {}",
                target, self.destinations[destination].name
            )),
            Err(e) => e,
        };
        warn!("Failed to change the routing: {}", err);
        if let Err(e) = self.resync(destination) {
            warn!("Could not re-read the route of destination {}: {}", destination, e);
        }
        Err(err)
    }
}
