use anyhow::Result;
use ndarray::ArrayD;
use robobase_core::{
    record::{Record, RecordValue},
    BoxSpace, DictSpace, Env, ObsDict, Step,
};

const DEMO_KEY: &str = "demo";

fn mark(info: &mut Record) {
    if !info.contains_key(DEMO_KEY) {
        info.insert(DEMO_KEY, RecordValue::Scalar(0.0));
    }
}

/// Adds `demo: 0` to the info unless the wrapped environment already sets `demo`.
pub struct AppendDemoInfo<E: Env> {
    env: E,
}

impl<E: Env> AppendDemoInfo<E> {
    /// Wraps `env`.
    pub fn new(env: E) -> Self {
        Self { env }
    }
}

impl<E: Env> Env for AppendDemoInfo<E> {
    fn reset(&mut self, seed: Option<u64>) -> Result<(ObsDict, Record)> {
        let (obs, mut info) = self.env.reset(seed)?;
        mark(&mut info);
        Ok((obs, info))
    }

    fn step(&mut self, act: &ArrayD<f32>) -> Result<Step> {
        let mut step = self.env.step(act)?;
        mark(&mut step.info);
        Ok(step)
    }

    fn observation_space(&self) -> &DictSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        self.env.action_space()
    }

    fn max_episode_steps(&self) -> usize {
        self.env.max_episode_steps()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wrappers::test_env::CountEnv;
    use ndarray::IxDyn;

    struct DemoMarked(CountEnv);

    impl Env for DemoMarked {
        fn reset(&mut self, seed: Option<u64>) -> Result<(ObsDict, Record)> {
            let (obs, _) = self.0.reset(seed)?;
            Ok((obs, Record::from_scalar(DEMO_KEY, 1.0)))
        }

        fn step(&mut self, act: &ArrayD<f32>) -> Result<Step> {
            self.0.step(act)
        }

        fn observation_space(&self) -> &DictSpace {
            self.0.observation_space()
        }

        fn action_space(&self) -> &BoxSpace {
            self.0.action_space()
        }

        fn max_episode_steps(&self) -> usize {
            self.0.max_episode_steps()
        }
    }

    #[test]
    fn test_append_demo_info() -> Result<()> {
        let mut env = AppendDemoInfo::new(DemoMarked(CountEnv::new(3)));
        let (_, info) = env.reset(None)?;
        assert_eq!(info.get_scalar("demo")?, 1.0);

        let step = env.step(&ArrayD::zeros(IxDyn(&[2])))?;
        assert_eq!(step.info.get_scalar("demo")?, 0.0);
        assert!(step.info.contains_key("action"));
        Ok(())
    }
}
