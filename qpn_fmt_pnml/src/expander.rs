//! Expansion of a colored net over the HadoopCap station template.
//!
//! The template ships the fixed station topology of a capacity-constrained
//! map/reduce deployment. The imported document contributes the colorsets:
//! the trailing four (start, reducing, mapping, resource) parameterize the
//! expansion, and every preceding set adds one job degree. Expansion
//! instantiates per-degree stations and classes and unrolls the template
//! transitions into per-color firing modes.

use crate::annotation::AnnotationParam;
use crate::colorset::{self, ColorSet};
use crate::parser::PnmlDocument;
use log::{info, trace, warn};
use qpn_core::{ClassId, ClassKind, Distribution, Measure, QpnModel, StationId, StationKind, MODE_NAME};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExpanderError {
    #[error("colored document declares {0} colorsets, at least 4 are required")]
    TooFewColorsets(usize),
    #[error("template has no station named `{0}`")]
    MissingStation(String),
    #[error("colorset `{set}` has no color with index {index}")]
    MissingColor { set: String, index: usize },
}

/// One entry of the acquisition mode grid: job degree, resource degree
/// and the firing priority of the resulting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ModeSpec {
    job: usize,
    res: usize,
    priority: i32,
}

// Modes pairing a job with its own resource pool fire preferentially.
fn acquisition_grid(degree: usize) -> Vec<ModeSpec> {
    let mut grid = Vec::with_capacity(degree * degree);
    for job in 0..degree {
        for res in 0..degree {
            grid.push(ModeSpec {
                job,
                res,
                priority: i32::from(job == res),
            });
        }
    }
    grid
}

fn color_tokens(set: &ColorSet, index: usize) -> Result<u32, ExpanderError> {
    set.colors
        .get(index)
        .map(|c| c.tokens)
        .ok_or_else(|| ExpanderError::MissingColor {
            set: set.name.clone(),
            index,
        })
}

// Handles of the stations the template is required to ship.
struct Template {
    think: StationId,
    job_queue: StationId,
    start_job: StationId,
    ready_for_job: StationId,
    red_queue: StationId,
    fork_maps: StationId,
    map_queue: StationId,
    map_acq_res: StationId,
    free_ress: StationId,
    map_rel_res: StationId,
    join_maps: StationId,
    map_phase_over: StationId,
    run_red_phase: StationId,
    fork_reds: StationId,
    red_acq_res: StationId,
    red_rel_res: StationId,
    join_reds: StationId,
}

impl Template {
    fn resolve(model: &QpnModel) -> Result<Self, ExpanderError> {
        let station = |name: &str| {
            model
                .station_by_name(name)
                .ok_or_else(|| ExpanderError::MissingStation(name.to_string()))
        };
        Ok(Template {
            think: station("Think")?,
            job_queue: station("JobQueue")?,
            start_job: station("StartJob")?,
            ready_for_job: station("ReadyForJob")?,
            red_queue: station("RedQueue")?,
            fork_maps: station("ForkMaps")?,
            map_queue: station("MapQueue")?,
            map_acq_res: station("MapAcqRes")?,
            free_ress: station("FreeRess")?,
            map_rel_res: station("MapRelRes")?,
            join_maps: station("JoinMaps")?,
            map_phase_over: station("MapPhaseOver")?,
            run_red_phase: station("RunRedPhase")?,
            fork_reds: station("ForkReds")?,
            red_acq_res: station("RedAcqRes")?,
            red_rel_res: station("RedRelRes")?,
            join_reds: station("JoinReds")?,
        })
    }
}

/// Expands a colored document over the loaded HadoopCap template model.
pub struct HadoopCapBuilder {
    model: QpnModel,
    template: Template,
    degree: usize,
    map_execs: Vec<StationId>,
    map_dones: Vec<StationId>,
    red_execs: Vec<StationId>,
    red_dones: Vec<StationId>,
    jobs: Vec<ClassId>,
    ress: Vec<ClassId>,
    flags: Vec<ClassId>,
}

impl HadoopCapBuilder {
    /// Expands the colored document over the template model.
    ///
    /// The template is consumed and returned expanded. A document whose
    /// colorsets leave a degree of zero returns the template unchanged.
    pub fn visit(template: QpnModel, document: &PnmlDocument) -> anyhow::Result<QpnModel> {
        let sets = colorset::extract(&document.net_specifics)?;
        if sets.len() < 4 {
            return Err(ExpanderError::TooFewColorsets(sets.len()).into());
        }
        let degree = sets.len() - 4;
        info!(target: "builder", "expanding HadoopCap template with degree {degree}");
        let stations = Template::resolve(&template)?;
        let mut builder = HadoopCapBuilder {
            model: template,
            template: stations,
            degree,
            map_execs: Vec::with_capacity(degree),
            map_dones: Vec::with_capacity(degree),
            red_execs: Vec::with_capacity(degree),
            red_dones: Vec::with_capacity(degree),
            jobs: Vec::with_capacity(degree),
            ress: Vec::with_capacity(degree),
            flags: Vec::with_capacity(degree),
        };
        if degree == 0 {
            return Ok(builder.model);
        }
        // Reserved trailing sets, in fixed order.
        let start_set = &sets[degree];
        let reducing_set = &sets[degree + 1];
        let mapping_set = &sets[degree + 2];
        let resource_set = &sets[degree + 3];

        builder.build_stations()?;
        builder.build_classes(start_set, resource_set)?;
        builder.clear_placeholders()?;
        let grid = acquisition_grid(degree);
        for i in 0..degree {
            builder.build_start(document, start_set, i)?;
            builder.build_map_phase(document, mapping_set, &grid, i)?;
            builder.build_red_phase(document, reducing_set, &grid, i)?;
        }
        for i in 0..degree {
            builder
                .model
                .add_measure(Measure::Throughput(builder.template.join_reds, builder.jobs[i]))?;
        }
        Ok(builder.model)
    }

    fn build_stations(&mut self) -> anyhow::Result<()> {
        for j in 0..self.degree {
            let map_exec = self
                .model
                .add_station(&format!("MapExec{j}"), StationKind::Delay);
            let map_done = self
                .model
                .add_station(&format!("MapDone{j}"), StationKind::Place);
            self.model.set_connected(self.template.map_acq_res, map_exec)?;
            self.model.set_connected(map_exec, map_done)?;
            self.model.set_connected(map_done, self.template.map_rel_res)?;
            self.map_execs.push(map_exec);
            self.map_dones.push(map_done);

            let red_exec = self
                .model
                .add_station(&format!("RedExec{j}"), StationKind::Delay);
            let red_done = self
                .model
                .add_station(&format!("RedDone{j}"), StationKind::Place);
            self.model.set_connected(self.template.red_acq_res, red_exec)?;
            self.model.set_connected(red_exec, red_done)?;
            self.model.set_connected(red_done, self.template.red_rel_res)?;
            self.red_execs.push(red_exec);
            self.red_dones.push(red_done);
        }
        Ok(())
    }

    fn build_classes(&mut self, start_set: &ColorSet, resource_set: &ColorSet) -> anyhow::Result<()> {
        for i in 0..self.degree {
            let population = color_tokens(start_set, i)?;
            let job = self
                .model
                .add_class(&format!("Job{i}"), ClassKind::Closed, population, None);
            self.model.set_class_ref_station(job, self.template.think)?;
            self.model
                .set_preloaded_jobs(self.template.think, job, population)?;
            self.jobs.push(job);

            let population = color_tokens(resource_set, i)?;
            let res = self
                .model
                .add_class(&format!("Res{i}"), ClassKind::Closed, population, None);
            self.model
                .set_class_ref_station(res, self.template.free_ress)?;
            self.model
                .set_preloaded_jobs(self.template.free_ress, res, population)?;
            self.ress.push(res);

            let flag = self
                .model
                .add_class(&format!("Flag{i}"), ClassKind::Closed, 1, None);
            self.model
                .set_class_ref_station(flag, self.template.ready_for_job)?;
            self.model
                .set_preloaded_jobs(self.template.ready_for_job, flag, 1)?;
            self.flags.push(flag);
        }
        Ok(())
    }

    // Each generated-mode transition ships with a single placeholder
    // mode, dropped exactly once before its first real mode.
    fn clear_placeholders(&mut self) -> anyhow::Result<()> {
        for station in [
            self.template.start_job,
            self.template.map_acq_res,
            self.template.map_rel_res,
            self.template.run_red_phase,
            self.template.red_acq_res,
            self.template.red_rel_res,
        ] {
            self.model.delete_transition_mode(station, 0)?;
        }
        Ok(())
    }

    /// Looks up the firing-time annotation of the distribution-carrying
    /// transition `{set}_trans_{set}_{i}` of the imported document.
    ///
    /// A missing transition or absent grammar leaves the template
    /// default in place.
    fn mine_distribution(
        &self,
        document: &PnmlDocument,
        set: &ColorSet,
        i: usize,
    ) -> anyhow::Result<Option<Distribution>> {
        let name = format!("{0}_trans_{0}_{1}", set.name, i);
        let Some(transition) = document.transition_by_name(&name) else {
            warn!(target: "builder", "document has no transition named '{name}'");
            return Ok(None);
        };
        for specific in &transition.specifics {
            if let AnnotationParam::ExponentialFiring(rate) = AnnotationParam::decode(specific)? {
                trace!(target: "builder", "transition '{name}' carries rate {rate}");
                return Ok(Some(Distribution::Exponential(rate)));
            }
        }
        Ok(None)
    }

    fn build_start(
        &mut self,
        document: &PnmlDocument,
        start_set: &ColorSet,
        i: usize,
    ) -> anyhow::Result<()> {
        let job = self.jobs[i];
        if let Some(distribution) = self.mine_distribution(document, start_set, i)? {
            self.model
                .set_service_time_distribution(self.template.think, job, distribution)?;
        }
        let start_job = self.template.start_job;
        let index = self
            .model
            .add_transition_mode(start_job, &format!("{MODE_NAME}{i}"))?;
        self.model
            .set_enabling_condition(start_job, index, self.template.job_queue, job, 1)?;
        self.model.set_enabling_condition(
            start_job,
            index,
            self.template.ready_for_job,
            self.flags[i],
            1,
        )?;
        self.model
            .set_inhibiting_condition(start_job, index, self.template.red_queue, job, 1)?;
        self.model
            .set_firing_outcome(start_job, index, self.template.fork_maps, job, 1)?;
        Ok(())
    }

    fn build_map_phase(
        &mut self,
        document: &PnmlDocument,
        mapping_set: &ColorSet,
        grid: &[ModeSpec],
        i: usize,
    ) -> anyhow::Result<()> {
        let job = self.jobs[i];
        self.model.set_fork_out_path(
            self.template.fork_maps,
            job,
            self.template.map_queue,
            color_tokens(mapping_set, i)?,
            1.0,
        )?;
        for spec in grid.iter().filter(|spec| spec.job == i) {
            let index = self.model.add_transition_mode(
                self.template.map_acq_res,
                &format!("{MODE_NAME}{}{}", spec.job, spec.res),
            )?;
            if spec.priority != 0 {
                self.model
                    .set_firing_priority(self.template.map_acq_res, index, spec.priority)?;
            }
            self.model.set_enabling_condition(
                self.template.map_acq_res,
                index,
                self.template.map_queue,
                job,
                1,
            )?;
            self.model.set_enabling_condition(
                self.template.map_acq_res,
                index,
                self.template.free_ress,
                self.ress[spec.res],
                1,
            )?;
            self.model.set_firing_outcome(
                self.template.map_acq_res,
                index,
                self.map_execs[spec.res],
                job,
                1,
            )?;
        }
        if let Some(distribution) = self.mine_distribution(document, mapping_set, i)? {
            for j in 0..self.degree {
                self.model
                    .set_service_time_distribution(self.map_execs[j], job, distribution)?;
            }
        }
        for j in 0..self.degree {
            let index = self.model.add_transition_mode(
                self.template.map_rel_res,
                &format!("{MODE_NAME}{i}{j}"),
            )?;
            self.model.set_enabling_condition(
                self.template.map_rel_res,
                index,
                self.map_dones[j],
                job,
                1,
            )?;
            self.model.set_firing_outcome(
                self.template.map_rel_res,
                index,
                self.template.join_maps,
                job,
                1,
            )?;
            self.model.set_firing_outcome(
                self.template.map_rel_res,
                index,
                self.template.free_ress,
                self.ress[j],
                1,
            )?;
        }
        Ok(())
    }

    fn build_red_phase(
        &mut self,
        document: &PnmlDocument,
        reducing_set: &ColorSet,
        grid: &[ModeSpec],
        i: usize,
    ) -> anyhow::Result<()> {
        let job = self.jobs[i];
        let run_red_phase = self.template.run_red_phase;
        let index = self
            .model
            .add_transition_mode(run_red_phase, &format!("{MODE_NAME}{i}"))?;
        self.model.set_enabling_condition(
            run_red_phase,
            index,
            self.template.map_phase_over,
            job,
            1,
        )?;
        self.model
            .set_firing_outcome(run_red_phase, index, self.template.fork_reds, job, 1)?;
        self.model.set_firing_outcome(
            run_red_phase,
            index,
            self.template.ready_for_job,
            self.flags[i],
            1,
        )?;
        self.model.set_fork_out_path(
            self.template.fork_reds,
            job,
            self.template.red_queue,
            color_tokens(reducing_set, i)?,
            1.0,
        )?;
        for spec in grid.iter().filter(|spec| spec.job == i) {
            let index = self.model.add_transition_mode(
                self.template.red_acq_res,
                &format!("{MODE_NAME}{}{}", spec.job, spec.res),
            )?;
            if spec.priority != 0 {
                self.model
                    .set_firing_priority(self.template.red_acq_res, index, spec.priority)?;
            }
            self.model.set_enabling_condition(
                self.template.red_acq_res,
                index,
                self.template.red_queue,
                job,
                1,
            )?;
            self.model.set_enabling_condition(
                self.template.red_acq_res,
                index,
                self.template.free_ress,
                self.ress[spec.res],
                1,
            )?;
            self.model.set_firing_outcome(
                self.template.red_acq_res,
                index,
                self.red_execs[spec.res],
                job,
                1,
            )?;
        }
        if let Some(distribution) = self.mine_distribution(document, reducing_set, i)? {
            for j in 0..self.degree {
                self.model
                    .set_service_time_distribution(self.red_execs[j], job, distribution)?;
            }
        }
        for j in 0..self.degree {
            let index = self.model.add_transition_mode(
                self.template.red_rel_res,
                &format!("{MODE_NAME}{i}{j}"),
            )?;
            self.model.set_enabling_condition(
                self.template.red_rel_res,
                index,
                self.red_dones[j],
                job,
                1,
            )?;
            self.model.set_firing_outcome(
                self.template.red_rel_res,
                index,
                self.template.join_reds,
                job,
                1,
            )?;
            self.model.set_firing_outcome(
                self.template.red_rel_res,
                index,
                self.template.free_ress,
                self.ress[j],
                1,
            )?;
        }
        Ok(())
    }
}
